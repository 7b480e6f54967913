//! Series Materialization
//!
//! Reads one series from the index, fetches and decodes each of its chunks,
//! and keeps the samples that pass the filter.
//!
//! A series is materialized completely or not at all: the first fetch or
//! decode error aborts it and nothing from it reaches the sink.

use tracing::debug;
use tsdump_core::{
    ChunkDecoder, ChunkMeta, ChunkStore, Error, IndexSource, Label, LabelSet, Result, SeriesRef,
};

/// Inclusive timestamp window; non-finite values never pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFilter {
    pub min_timestamp: i64,
    pub max_timestamp: i64,
}

impl SampleFilter {
    pub fn new(min_timestamp: i64, max_timestamp: i64) -> Result<Self> {
        if min_timestamp > max_timestamp {
            return Err(Error::Config(format!(
                "min timestamp {} is after max timestamp {}",
                min_timestamp, max_timestamp
            )));
        }
        Ok(Self {
            min_timestamp,
            max_timestamp,
        })
    }

    /// `[0, i64::MAX]`, every sample at or after the epoch.
    pub fn all() -> Self {
        Self {
            min_timestamp: 0,
            max_timestamp: i64::MAX,
        }
    }

    pub fn accepts(&self, timestamp: i64, value: f64) -> bool {
        value.is_finite() && timestamp >= self.min_timestamp && timestamp <= self.max_timestamp
    }
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Filtered samples of one chunk; never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSamples {
    pub meta: ChunkMeta,
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedSeries {
    pub labels: LabelSet,
    pub chunks: Vec<ChunkSamples>,
    /// Chunks that had no samples left after filtering
    pub skipped_chunks: usize,
}

impl MaterializedSeries {
    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(|c| c.timestamps.len()).sum()
    }
}

pub struct SeriesMaterializer<'a, I: ?Sized, C, D> {
    index: &'a I,
    chunks: C,
    decoder: D,
    filter: SampleFilter,
    static_labels: Vec<Label>,
}

impl<'a, I, C, D> SeriesMaterializer<'a, I, C, D>
where
    I: IndexSource + ?Sized,
    C: ChunkStore,
    D: ChunkDecoder,
{
    /// `static_labels` are appended to every series as given.
    pub fn new(
        index: &'a I,
        chunks: C,
        decoder: D,
        filter: SampleFilter,
        static_labels: Vec<Label>,
    ) -> Self {
        Self {
            index,
            chunks,
            decoder,
            filter,
            static_labels,
        }
    }

    pub fn materialize(&mut self, series: SeriesRef) -> Result<MaterializedSeries> {
        let (mut labels, metas) = self.index.series(series)?;
        labels.extend_from(&self.static_labels);

        let mut chunks = Vec::with_capacity(metas.len());
        let mut skipped_chunks = 0;
        for meta in metas {
            let samples = self
                .chunk_samples(meta)
                .map_err(|e| e.in_chunk(labels.to_string(), meta.chunk_ref))?;
            match samples {
                Some(samples) => chunks.push(samples),
                None => skipped_chunks += 1,
            }
        }

        debug!(series, labels = %labels, chunks = chunks.len(), skipped_chunks, "materialized series");
        Ok(MaterializedSeries {
            labels,
            chunks,
            skipped_chunks,
        })
    }

    fn chunk_samples(&mut self, meta: ChunkMeta) -> Result<Option<ChunkSamples>> {
        let record = self.chunks.chunk(meta.chunk_ref)?;

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        for sample in self.decoder.decode(&record)? {
            let (t, v) = sample?;
            if self.filter.accepts(t, v) {
                timestamps.push(t);
                values.push(v);
            }
        }

        if timestamps.is_empty() {
            return Ok(None);
        }
        Ok(Some(ChunkSamples {
            meta,
            timestamps,
            values,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tsdump_core::fixtures::XorEncoder;
    use tsdump_core::xor::ENCODING_XOR;
    use tsdump_core::{ChunkRecord, ChunkRef, ErrorKind, XorDecoder, METRIC_NAME};

    /// One-series index with in-memory chunks.
    struct MemBlock {
        labels: LabelSet,
        metas: Vec<ChunkMeta>,
        records: HashMap<ChunkRef, ChunkRecord>,
    }

    impl MemBlock {
        fn new(chunks: &[&[(i64, f64)]]) -> Self {
            let mut metas = Vec::new();
            let mut records = HashMap::new();
            for (i, samples) in chunks.iter().enumerate() {
                let r = ChunkRef::new(0, 8 + i as u32 * 100);
                let mut enc = XorEncoder::new();
                for &(t, v) in samples.iter() {
                    enc.append(t, v);
                }
                records.insert(
                    r,
                    ChunkRecord {
                        encoding: ENCODING_XOR,
                        payload: Bytes::from(enc.finish()),
                    },
                );
                metas.push(ChunkMeta::new(r, samples[0].0, samples[samples.len() - 1].0));
            }
            Self {
                labels: [(METRIC_NAME, "up"), ("instance", "a")].into_iter().collect(),
                metas,
                records,
            }
        }
    }

    impl IndexSource for MemBlock {
        fn postings(&self, _: &str, _: &str) -> Result<Vec<SeriesRef>> {
            Ok(vec![0])
        }

        fn series(&self, _: SeriesRef) -> Result<(LabelSet, Vec<ChunkMeta>)> {
            Ok((self.labels.clone(), self.metas.clone()))
        }
    }

    struct MemChunks<'a>(&'a HashMap<ChunkRef, ChunkRecord>);

    impl ChunkStore for MemChunks<'_> {
        fn chunk(&mut self, r: ChunkRef) -> Result<ChunkRecord> {
            self.0
                .get(&r)
                .cloned()
                .ok_or_else(|| Error::CorruptChunk(format!("no chunk at {}", r)))
        }
    }

    fn run(block: &MemBlock, filter: SampleFilter, extra: Vec<Label>) -> Result<MaterializedSeries> {
        let mut m = SeriesMaterializer::new(block, MemChunks(&block.records), XorDecoder, filter, extra);
        m.materialize(0)
    }

    #[test]
    fn test_drops_non_finite_values() {
        let block = MemBlock::new(&[&[
            (1000, 1.0),
            (2000, f64::NAN),
            (3000, 1.0),
            (4000, f64::INFINITY),
            (5000, f64::NEG_INFINITY),
        ]]);
        let series = run(&block, SampleFilter::all(), Vec::new()).unwrap();

        assert_eq!(series.chunks.len(), 1);
        assert_eq!(series.chunks[0].timestamps, vec![1000, 3000]);
        assert_eq!(series.chunks[0].values, vec![1.0, 1.0]);
    }

    #[test]
    fn test_timestamp_bounds_are_inclusive() {
        let block = MemBlock::new(&[&[(1000, 1.0), (1500, 2.0), (2000, 3.0), (2500, 4.0)]]);
        let series = run(&block, SampleFilter::new(1500, 2000).unwrap(), Vec::new()).unwrap();
        assert_eq!(series.chunks[0].timestamps, vec![1500, 2000]);
        assert_eq!(series.chunks[0].values, vec![2.0, 3.0]);
    }

    #[test]
    fn test_empty_chunks_are_skipped() {
        let block = MemBlock::new(&[&[(1000, 1.0)], &[(5000, 2.0)], &[(6000, f64::NAN)]]);
        let series = run(&block, SampleFilter::new(0, 1500).unwrap(), Vec::new()).unwrap();

        assert_eq!(series.chunks.len(), 1);
        assert_eq!(series.chunks[0].meta, block.metas[0]);
        assert_eq!(series.skipped_chunks, 2);
        assert_eq!(series.sample_count(), 1);
    }

    #[test]
    fn test_static_labels_appended_verbatim() {
        let block = MemBlock::new(&[&[(1000, 1.0)]]);
        let extra = vec![Label::new("instance", "override"), Label::new("dc", "eu")];
        let series = run(&block, SampleFilter::all(), extra).unwrap();

        let labels = series.labels.as_slice();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[2], Label::new("instance", "override"));
        assert_eq!(labels[3], Label::new("dc", "eu"));
    }

    #[test]
    fn test_decode_error_aborts_whole_series() {
        let mut block = MemBlock::new(&[&[(1000, 1.0)], &[(2000, 2.0)]]);
        let second = block.metas[1].chunk_ref;
        block.records.get_mut(&second).unwrap().encoding = 3;

        let err = run(&block, SampleFilter::all(), Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        match err {
            Error::Chunk {
                series, chunk_ref, ..
            } => {
                assert!(series.contains("instance=\"a\""));
                assert_eq!(chunk_ref, second);
            }
            other => panic!("expected chunk context, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_chunk_aborts() {
        let mut block = MemBlock::new(&[&[(1000, 1.0)]]);
        block.records.clear();
        assert!(run(&block, SampleFilter::all(), Vec::new()).is_err());
    }

    #[test]
    fn test_filter_rejects_inverted_window() {
        let err = SampleFilter::new(10, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(SampleFilter::all().accepts(i64::MAX, 0.0));
        assert!(!SampleFilter::all().accepts(-1, 0.0));
    }
}
