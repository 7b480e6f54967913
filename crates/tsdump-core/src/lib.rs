pub mod chunk_ref;
pub mod codec;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
pub mod index;
pub mod labels;
pub mod source;
pub mod varint;
pub mod xor;

pub use chunk_ref::{ChunkMeta, ChunkRef, SeriesRef};
pub use codec::{decode_at, ChunkRecord, ChunkStore};
pub use error::{Error, ErrorKind, Result};
pub use index::IndexSource;
pub use labels::{Label, LabelSet, METRIC_NAME};
pub use source::{MemorySource, RangedByteSource};
pub use xor::{ChunkDecoder, SampleIter, XorDecoder};
