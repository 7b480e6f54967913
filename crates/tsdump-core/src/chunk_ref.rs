//! Chunk and Series References
//!
//! A block's index never stores chunk bytes, only references to where they
//! live. This module defines those references.
//!
//! ## ChunkRef Layout
//!
//! ```text
//!  63                32 31                 0
//! ┌────────────────────┬────────────────────┐
//! │   segment id       │   byte offset      │
//! └────────────────────┴────────────────────┘
//! ```
//!
//! - **segment id**: which `chunks/NNNNNN` file holds the record
//! - **byte offset**: where the record header starts inside that file
//!
//! All bit arithmetic for this layout lives here; call sites use
//! [`ChunkRef::segment`] and [`ChunkRef::offset`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle addressing one chunk record inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkRef(u64);

impl ChunkRef {
    pub fn new(segment: u32, offset: u32) -> Self {
        Self(((segment as u64) << 32) | offset as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Segment sequence id (upper 32 bits)
    pub fn segment(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Byte offset of the record header within the segment (lower 32 bits)
    pub fn offset(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {} offset {}", self.segment(), self.offset())
    }
}

/// Opaque series handle assigned by the index.
pub type SeriesRef = u64;

/// Where a chunk lives and which time range it claims to cover.
///
/// The bounds are informational; decoding never trusts them to skip a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    #[serde(rename = "ref")]
    pub chunk_ref: ChunkRef,

    /// Minimum timestamp in milliseconds since epoch
    #[serde(rename = "minTime")]
    pub min_time: i64,

    /// Maximum timestamp in milliseconds since epoch
    #[serde(rename = "maxTime")]
    pub max_time: i64,
}

impl ChunkMeta {
    pub fn new(chunk_ref: ChunkRef, min_time: i64, max_time: i64) -> Self {
        Self {
            chunk_ref,
            min_time,
            max_time,
        }
    }
}
