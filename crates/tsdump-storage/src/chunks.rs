//! Segment Chunk Store
//!
//! Resolves a [`ChunkRef`] to a verified chunk record by opening the segment
//! file it names and decoding the record at its offset.
//!
//! ## Segment Files
//!
//! ```text
//! <block>/chunks/000000
//! ┌──────────────────┬──────────┬──────────┬─────┐
//! │ header (8 bytes) │ record 0 │ record 1 │ ... │
//! │ magic 0x85BD40DD │          │          │     │
//! └──────────────────┴──────────┴──────────┴─────┘
//! ```
//!
//! The file number is the segment id plus the configured first file number
//! (see [`SegmentNaming`]). Segments are opened on first use and the handle
//! is kept until [`SegmentChunkStore::close`]. For remote blocks a handle is
//! just the object size from one HEAD; record bytes are fetched per call.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::debug;
use tsdump_core::{decode_at, ChunkRecord, ChunkRef, ChunkStore, Error, RangedByteSource, Result};

use crate::local::LocalFile;
use crate::remote::{ObjectClient, RemoteObject};

/// Magic number at the start of a segment file.
pub const SEGMENT_MAGIC: u32 = 0x85BD_40DD;

/// Size of the segment file header (magic, version, padding).
pub const SEGMENT_HEADER_SIZE: u64 = 8;

/// Maps segment ids to segment file names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentNaming {
    first_file: u32,
}

impl SegmentNaming {
    /// `first_file` is the number of the file holding segment id 0.
    pub fn new(first_file: u32) -> Self {
        Self { first_file }
    }

    /// Path of the segment relative to the block root, e.g. `chunks/000001`.
    pub fn locator(&self, segment: u32) -> String {
        format!("chunks/{:06}", segment as u64 + self.first_file as u64)
    }
}

enum SegmentBackend {
    Local {
        dir: PathBuf,
    },
    Remote {
        client: Arc<dyn ObjectClient>,
        prefix: String,
        runtime: Arc<Runtime>,
        timeout: Duration,
    },
}

pub struct SegmentChunkStore {
    backend: SegmentBackend,
    naming: SegmentNaming,
    segments: HashMap<u32, Box<dyn RangedByteSource>>,
}

impl SegmentChunkStore {
    /// Store reading segments under `<block_dir>/chunks`.
    pub fn local(block_dir: impl Into<PathBuf>, naming: SegmentNaming) -> Self {
        Self {
            backend: SegmentBackend::Local {
                dir: block_dir.into(),
            },
            naming,
            segments: HashMap::new(),
        }
    }

    /// Store reading segments under `<prefix>/chunks` through `client`.
    pub fn remote(
        client: Arc<dyn ObjectClient>,
        prefix: impl Into<String>,
        runtime: Arc<Runtime>,
        timeout: Duration,
        naming: SegmentNaming,
    ) -> Self {
        Self {
            backend: SegmentBackend::Remote {
                client,
                prefix: prefix.into(),
                runtime,
                timeout,
            },
            naming,
            segments: HashMap::new(),
        }
    }

    /// Number of segment handles currently open.
    pub fn open_segments(&self) -> usize {
        self.segments.len()
    }

    /// Drop every open segment handle. Later reads re-open lazily.
    pub fn close(&mut self) {
        if !self.segments.is_empty() {
            debug!(count = self.segments.len(), "closing segments");
        }
        self.segments.clear();
    }

    fn open(&self, segment: u32) -> Result<Box<dyn RangedByteSource>> {
        let locator = self.naming.locator(segment);
        debug!(segment, locator = %locator, "opening segment");

        match &self.backend {
            SegmentBackend::Local { dir } => Ok(Box::new(LocalFile::open(dir.join(&locator))?)),
            SegmentBackend::Remote {
                client,
                prefix,
                runtime,
                timeout,
            } => {
                let key = if prefix.is_empty() {
                    locator
                } else {
                    format!("{}/{}", prefix, locator)
                };
                Ok(Box::new(RemoteObject::open(
                    client.clone(),
                    key,
                    runtime.clone(),
                    *timeout,
                )?))
            }
        }
    }

    fn segment(&mut self, segment: u32) -> Result<&dyn RangedByteSource> {
        if !self.segments.contains_key(&segment) {
            let source = self.open(segment)?;
            self.segments.insert(segment, source);
        }
        self.segments
            .get(&segment)
            .map(|s| s.as_ref())
            .ok_or_else(|| Error::Config(format!("segment {} not open", segment)))
    }
}

impl ChunkStore for SegmentChunkStore {
    fn chunk(&mut self, chunk_ref: ChunkRef) -> Result<ChunkRecord> {
        let offset = chunk_ref.offset() as u64;
        let source = self.segment(chunk_ref.segment())?;

        if offset < SEGMENT_HEADER_SIZE && has_segment_header(source)? {
            return Err(Error::OutOfBounds {
                context: format!("{} @ {} is inside the segment header", source.describe(), offset),
                start: offset,
                end: SEGMENT_HEADER_SIZE,
                len: source.len(),
            });
        }

        decode_at(source, offset)
    }
}

impl Drop for SegmentChunkStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn has_segment_header(source: &dyn RangedByteSource) -> Result<bool> {
    if source.len() < SEGMENT_HEADER_SIZE {
        return Ok(false);
    }
    let head = source.range(0, 4)?;
    Ok(head[..] == SEGMENT_MAGIC.to_be_bytes())
}
