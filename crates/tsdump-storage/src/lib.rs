//! tsdb-dump Storage Layer
//!
//! This crate gives random access to the chunks of a TSDB block without
//! downloading or memory-mapping the block first. The same code path serves
//! blocks on a local filesystem and blocks in S3-compatible object storage.
//!
//! ## Architecture Overview
//!
//! ```text
//!           BlockLocation::parse("s3://bucket/prefix" | "/path")
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ Block                                                │
//! │  ┌──────────────────────┐  ┌───────────────────────┐ │
//! │  │ IndexReader          │  │ SegmentChunkStore     │ │
//! │  │ - symbols            │  │ - chunks/NNNNNN       │ │
//! │  │ - postings offsets   │  │ - one handle/segment  │ │
//! │  └──────────┬───────────┘  └───────────┬───────────┘ │
//! └─────────────┼──────────────────────────┼─────────────┘
//!               │       RangedByteSource   │
//!               ▼                          ▼
//!        ┌─────────────┐            ┌──────────────┐
//!        │ LocalFile   │            │ RemoteObject │
//!        │ (pread)     │            │ HEAD + GETs  │
//!        └─────────────┘            └──────────────┘
//! ```
//!
//! ## Main Components
//!
//! ### RemoteObject
//! One HEAD at open to learn the size, then one ranged GET per read. Every
//! request is bounded by [`StorageConfig::request_timeout_secs`]. Nothing is
//! cached and nothing is retried.
//!
//! ### SegmentChunkStore
//! Resolves a chunk reference to its segment file, opens it on first use and
//! decodes the checksummed record at the referenced offset.
//!
//! ### IndexReader
//! Reads a version 2 index. The symbol table and postings offset table are
//! loaded at open; postings lists and series entries are read on demand.
//!
//! ## Usage Example
//!
//! ```ignore
//! use tsdump_core::{ChunkStore, IndexSource};
//! use tsdump_storage::{Block, BlockLocation, StorageConfig};
//!
//! let location = BlockLocation::parse("/var/lib/prometheus/01HXYZ")?;
//! let mut block = Block::open(&location, &StorageConfig::default())?;
//! let (index, chunks) = block.parts();
//!
//! let (labels, metas) = index.series(index.postings("job", "node")?[0])?;
//! let record = chunks.chunk(metas[0].chunk_ref)?;
//! ```

pub mod block;
pub mod chunks;
pub mod config;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
pub mod index;
pub mod local;
pub mod location;
pub mod remote;

pub use block::{Block, BlockIndex};
pub use chunks::{SegmentChunkStore, SegmentNaming};
pub use config::StorageConfig;
pub use index::IndexReader;
pub use local::LocalFile;
pub use location::BlockLocation;
pub use remote::{
    new_runtime, ByteRange, ObjectClient, ObjectStoreClient, RegionSource, RemoteObject,
};
