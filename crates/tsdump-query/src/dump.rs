//! Dump Drivers
//!
//! Wire postings, materialization and a sink together for one block.
//!
//! ## Sample Dump
//!
//! ```text
//! PostingsQuery ──refs──▶ SeriesMaterializer ──chunks──▶ SampleSink::write
//!                                                    ...
//!                                              end ──▶ SampleSink::flush
//! ```
//!
//! Strictly sequential: one series at a time, one chunk at a time. The sink
//! sees a series only after all of its chunks decoded, and is flushed only
//! when the whole dump succeeded.
//!
//! ## Index Dump
//!
//! Walks the same postings but reports labels and chunk metadata per series
//! without touching any segment.

use tracing::info;
use tsdump_core::{ChunkDecoder, ChunkMeta, ChunkStore, IndexSource, Label, LabelSet, Result, SeriesRef};

use crate::materialize::{SampleFilter, SeriesMaterializer};
use crate::postings::PostingsQuery;
use crate::sink::SampleSink;

/// What to dump.
#[derive(Debug, Clone, Default)]
pub struct DumpRequest {
    pub query: PostingsQuery,
    pub filter: SampleFilter,
    /// Appended to every series, duplicates included
    pub static_labels: Vec<Label>,
}

/// Counters for one dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub series: u64,
    pub chunks: u64,
    pub samples: u64,
    pub skipped_chunks: u64,
}

/// Stream every matching series through `sink`.
pub fn dump_samples<I, C, D, S>(
    index: &I,
    chunks: C,
    decoder: D,
    request: &DumpRequest,
    sink: &mut S,
) -> Result<DumpStats>
where
    I: IndexSource + ?Sized,
    C: ChunkStore,
    D: ChunkDecoder,
    S: SampleSink + ?Sized,
{
    let mut materializer = SeriesMaterializer::new(
        index,
        chunks,
        decoder,
        request.filter,
        request.static_labels.clone(),
    );
    let mut stats = DumpStats::default();

    for series in request.query.resolve(index)? {
        let series = materializer.materialize(series?)?;
        for chunk in &series.chunks {
            sink.write(&series.labels, &chunk.timestamps, &chunk.values)?;
            stats.chunks += 1;
            stats.samples += chunk.timestamps.len() as u64;
        }
        stats.series += 1;
        stats.skipped_chunks += series.skipped_chunks as u64;
    }

    sink.flush()?;
    info!(
        series = stats.series,
        chunks = stats.chunks,
        samples = stats.samples,
        skipped_chunks = stats.skipped_chunks,
        "dump complete"
    );
    Ok(stats)
}

/// Report labels and chunk metadata of every matching series to `emit`.
/// Returns the number of series reported.
pub fn dump_index<I, F>(index: &I, query: &PostingsQuery, mut emit: F) -> Result<u64>
where
    I: IndexSource + ?Sized,
    F: FnMut(SeriesRef, &LabelSet, &[ChunkMeta]) -> Result<()>,
{
    let mut count = 0;
    for series in query.resolve(index)? {
        let series = series?;
        let (labels, metas) = index.series(series)?;
        emit(series, &labels, &metas)?;
        count += 1;
    }
    info!(series = count, "index dump complete");
    Ok(count)
}
