//! Block fixtures for tests.
//!
//! [`BlockBuilder`] lays out a complete block in memory: XOR chunk records in
//! `chunks/NNNNNN` segments and a version 2 index referencing them. The
//! result can be written to a directory or uploaded to an object store.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;

use bytes::{BufMut, Bytes};
use object_store::ObjectStore;
use tsdump_core::fixtures::{encode_record, XorEncoder};
use tsdump_core::varint::{encode_varint, encode_varint_u64};
use tsdump_core::xor::ENCODING_XOR;
use tsdump_core::{ChunkRef, SeriesRef};

use crate::chunks::{SegmentNaming, SEGMENT_MAGIC};
use crate::index::{INDEX_MAGIC, INDEX_VERSION};

struct FixtureSeries {
    labels: Vec<(String, String)>,
    chunks: Vec<Vec<(i64, f64)>>,
}

/// A block laid out in memory.
#[derive(Debug, Clone)]
pub struct BuiltBlock {
    /// Contents of the `index` file
    pub index: Vec<u8>,
    /// `(locator, contents)` of every segment, e.g. `("chunks/000000", ..)`
    pub segments: Vec<(String, Vec<u8>)>,
    /// Series references in insertion order
    pub series_refs: Vec<SeriesRef>,
    /// Chunk references per series, in insertion order
    pub chunk_refs: Vec<Vec<ChunkRef>>,
}

impl BuiltBlock {
    pub fn write_to_dir(&self, dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dir.join("chunks"))?;
        std::fs::write(dir.join("index"), &self.index)?;
        for (locator, data) in &self.segments {
            std::fs::write(dir.join(locator), data)?;
        }
        Ok(())
    }

    /// Upload the block under `prefix` (no trailing slash; empty for the bucket root).
    pub async fn upload(&self, store: &dyn ObjectStore, prefix: &str) -> object_store::Result<()> {
        let key = |name: &str| {
            if prefix.is_empty() {
                object_store::path::Path::from(name)
            } else {
                object_store::path::Path::from(format!("{}/{}", prefix, name))
            }
        };
        store.put(&key("index"), Bytes::from(self.index.clone())).await?;
        for (locator, data) in &self.segments {
            store.put(&key(locator), Bytes::from(data.clone())).await?;
        }
        Ok(())
    }
}

pub struct BlockBuilder {
    series: Vec<FixtureSeries>,
    naming: SegmentNaming,
    segment_header: bool,
    max_segment_size: usize,
    raw_chunks: Vec<(usize, usize, Vec<u8>)>,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self {
            series: Vec::new(),
            naming: SegmentNaming::default(),
            segment_header: true,
            max_segment_size: 512 * 1024 * 1024,
            raw_chunks: Vec::new(),
        }
    }

    /// Add a series; each inner vec becomes one XOR chunk.
    pub fn series(mut self, labels: &[(&str, &str)], chunks: Vec<Vec<(i64, f64)>>) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        labels.sort();
        self.series.push(FixtureSeries { labels, chunks });
        self
    }

    /// Replace the encoded record of chunk `chunk` of series `series` with `bytes`.
    pub fn raw_chunk(mut self, series: usize, chunk: usize, bytes: Vec<u8>) -> Self {
        self.raw_chunks.push((series, chunk, bytes));
        self
    }

    pub fn first_segment_file(mut self, first: u32) -> Self {
        self.naming = SegmentNaming::new(first);
        self
    }

    /// Omit the 8-byte segment header.
    pub fn without_segment_header(mut self) -> Self {
        self.segment_header = false;
        self
    }

    /// Start a new segment once the current one reaches `size` bytes.
    pub fn max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    pub fn build(&self) -> BuiltBlock {
        let (segments, chunk_refs) = self.build_segments();
        let (index, series_refs) = self.build_index(&chunk_refs);
        BuiltBlock {
            index,
            segments,
            series_refs,
            chunk_refs,
        }
    }

    fn new_segment(&self) -> Vec<u8> {
        let mut seg = Vec::new();
        if self.segment_header {
            seg.put_u32(SEGMENT_MAGIC);
            seg.extend_from_slice(&[1, 0, 0, 0]);
        }
        seg
    }

    fn build_segments(&self) -> (Vec<(String, Vec<u8>)>, Vec<Vec<ChunkRef>>) {
        let mut segments: Vec<Vec<u8>> = vec![self.new_segment()];
        let mut refs = Vec::new();

        for (si, series) in self.series.iter().enumerate() {
            let mut series_refs = Vec::new();
            for (ci, samples) in series.chunks.iter().enumerate() {
                let record = match self
                    .raw_chunks
                    .iter()
                    .find(|(s, c, _)| *s == si && *c == ci)
                {
                    Some((_, _, raw)) => raw.clone(),
                    None => {
                        let mut enc = XorEncoder::new();
                        for &(t, v) in samples {
                            enc.append(t, v);
                        }
                        encode_record(ENCODING_XOR, &enc.finish())
                    }
                };

                let header_len = self.new_segment().len();
                let current_len = segments.last().map_or(0, Vec::len);
                if current_len > header_len && current_len + record.len() > self.max_segment_size {
                    segments.push(self.new_segment());
                }

                let segment_id = (segments.len() - 1) as u32;
                if let Some(current) = segments.last_mut() {
                    series_refs.push(ChunkRef::new(segment_id, current.len() as u32));
                    current.extend_from_slice(&record);
                }
            }
            refs.push(series_refs);
        }

        let named = segments
            .into_iter()
            .enumerate()
            .map(|(i, data)| (self.naming.locator(i as u32), data))
            .collect();
        (named, refs)
    }

    fn build_index(&self, chunk_refs: &[Vec<ChunkRef>]) -> (Vec<u8>, Vec<SeriesRef>) {
        let mut out = Vec::new();
        out.put_u32(INDEX_MAGIC);
        out.put_u8(INDEX_VERSION);

        // symbols
        let symbols: BTreeSet<&str> = self
            .series
            .iter()
            .flat_map(|s| s.labels.iter())
            .flat_map(|(n, v)| [n.as_str(), v.as_str()])
            .collect();
        let symbol_idx: BTreeMap<&str, u64> = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, i as u64))
            .collect();

        let symbols_off = out.len() as u64;
        let mut content = Vec::new();
        content.put_u32(symbols.len() as u32);
        for s in &symbols {
            put_uvarint_str(&mut content, s);
        }
        put_table(&mut out, &content);

        // series
        pad_to(&mut out, 16);
        let series_off = out.len() as u64;
        let mut series_refs = Vec::new();
        for (series, chunks) in self.series.iter().zip(chunk_refs) {
            pad_to(&mut out, 16);
            series_refs.push(out.len() as u64 / 16);

            let mut content = Vec::new();
            encode_varint_u64(&mut content, series.labels.len() as u64);
            for (n, v) in &series.labels {
                encode_varint_u64(&mut content, symbol_idx[n.as_str()]);
                encode_varint_u64(&mut content, symbol_idx[v.as_str()]);
            }

            encode_varint_u64(&mut content, chunks.len() as u64);
            let mut prev_max = 0i64;
            let mut prev_ref = 0u64;
            for (i, (samples, r)) in series.chunks.iter().zip(chunks).enumerate() {
                let min = samples.first().map_or(0, |s| s.0);
                let max = samples.last().map_or(0, |s| s.0);
                if i == 0 {
                    encode_varint(&mut content, min);
                    encode_varint_u64(&mut content, (max - min) as u64);
                    encode_varint_u64(&mut content, r.raw());
                } else {
                    encode_varint_u64(&mut content, (min - prev_max) as u64);
                    encode_varint_u64(&mut content, (max - min) as u64);
                    encode_varint(&mut content, r.raw() as i64 - prev_ref as i64);
                }
                prev_max = max;
                prev_ref = r.raw();
            }

            encode_varint_u64(&mut out, content.len() as u64);
            out.extend_from_slice(&content);
            out.put_u32(crc32c::crc32c(&content));
        }

        // postings: every (name, value) plus the all-series key
        let mut postings: BTreeMap<(String, String), Vec<u32>> = BTreeMap::new();
        for (series, r) in self.series.iter().zip(&series_refs) {
            postings
                .entry((String::new(), String::new()))
                .or_default()
                .push(*r as u32);
            for (n, v) in &series.labels {
                postings.entry((n.clone(), v.clone())).or_default().push(*r as u32);
            }
        }

        pad_to(&mut out, 4);
        let postings_off = out.len() as u64;
        let mut postings_offsets = Vec::new();
        for ((name, value), refs) in &postings {
            pad_to(&mut out, 4);
            postings_offsets.push((name, value, out.len() as u64));
            let mut content = Vec::new();
            content.put_u32(refs.len() as u32);
            for r in refs {
                content.put_u32(*r);
            }
            put_table(&mut out, &content);
        }

        let postings_table_off = out.len() as u64;
        let mut content = Vec::new();
        content.put_u32(postings_offsets.len() as u32);
        for (name, value, off) in &postings_offsets {
            encode_varint_u64(&mut content, 2);
            put_uvarint_str(&mut content, name);
            put_uvarint_str(&mut content, value);
            encode_varint_u64(&mut content, *off);
        }
        put_table(&mut out, &content);

        // TOC; label indices are not written
        let mut toc = Vec::new();
        for off in [symbols_off, series_off, 0, 0, postings_off, postings_table_off] {
            toc.put_u64(off);
        }
        let crc = crc32c::crc32c(&toc);
        out.extend_from_slice(&toc);
        out.put_u32(crc);

        (out, series_refs)
    }
}

fn put_uvarint_str(buf: &mut Vec<u8>, s: &str) {
    encode_varint_u64(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn put_table(out: &mut Vec<u8>, content: &[u8]) {
    out.put_u32(content.len() as u32);
    out.extend_from_slice(content);
    out.put_u32(crc32c::crc32c(content));
}

fn pad_to(out: &mut Vec<u8>, alignment: usize) {
    while out.len() % alignment != 0 {
        out.push(0);
    }
}
