//! Query composition over a block: which series to read, which samples to
//! keep, and where to send them.
//!
//! - [`PostingsQuery`] resolves a label filter to an ordered stream of series
//! - [`SeriesMaterializer`] fetches, decodes and filters a series' chunks
//! - [`SampleSink`] receives the surviving samples
//! - [`dump_samples`] and [`dump_index`] drive a whole block

pub mod dump;
pub mod materialize;
pub mod postings;
pub mod sink;

pub use dump::{dump_index, dump_samples, DumpRequest, DumpStats};
pub use materialize::{ChunkSamples, MaterializedSeries, SampleFilter, SeriesMaterializer};
pub use postings::{intersect, parse_label_values, PostingsQuery, SeriesRefs};
pub use sink::{MemorySink, SampleSink, SinkWrite};
