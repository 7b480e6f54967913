//! Chunk Record Codec
//!
//! Decodes one chunk record from a segment, given the byte offset of its
//! header, and verifies its checksum.
//!
//! ## Record Layout
//!
//! ```text
//! ┌──────────────────┬──────────┬───────────────────┬──────────────┐
//! │ data length      │ encoding │ payload           │ CRC-32C      │
//! │ (uvarint, 1-10B) │ (1 byte) │ (data length B)   │ (4 bytes BE) │
//! └──────────────────┴──────────┴───────────────────┴──────────────┘
//!                    └───────── checksummed ────────┘
//! ```
//!
//! ## Two-Phase Fetch
//!
//! The record length is unknown until the varint is parsed, so decoding does:
//! 1. One small read of the header window (at most 11 bytes)
//! 2. One exact read of the whole record
//!
//! Against a remote source this is two ranged GETs per chunk and never
//! transfers bytes past the end of the record.

use bytes::Bytes;
use tracing::trace;

use crate::chunk_ref::ChunkRef;
use crate::error::{Error, Result};
use crate::source::RangedByteSource;
use crate::varint::{decode_uvarint, MAX_VARINT_LEN};

/// Size of the encoding byte following the length prefix
pub const CHUNK_ENCODING_SIZE: u64 = 1;

/// Size of the trailing checksum
pub const CHECKSUM_SIZE: u64 = 4;

const HEADER_WINDOW: u64 = MAX_VARINT_LEN as u64 + CHUNK_ENCODING_SIZE;

/// A checksum-verified chunk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub encoding: u8,
    pub payload: Bytes,
}

/// Fetches verified chunk records by reference.
pub trait ChunkStore {
    fn chunk(&mut self, chunk_ref: ChunkRef) -> Result<ChunkRecord>;
}

impl<C: ChunkStore + ?Sized> ChunkStore for &mut C {
    fn chunk(&mut self, chunk_ref: ChunkRef) -> Result<ChunkRecord> {
        (**self).chunk(chunk_ref)
    }
}

/// Read and verify the record whose header starts at `offset`.
pub fn decode_at<S: RangedByteSource + ?Sized>(source: &S, offset: u64) -> Result<ChunkRecord> {
    let len = source.len();
    let context = || format!("{} @ {}", source.describe(), offset);

    if offset >= len {
        return Err(Error::OutOfBounds {
            context: context(),
            start: offset,
            end: offset,
            len,
        });
    }

    let window_end = len.min(offset + HEADER_WINDOW);
    let header = source.range(offset, window_end)?;

    let (data_len, varint_len) =
        decode_uvarint(&header).ok_or_else(|| Error::MalformedVarint { context: context() })?;

    let total = (varint_len as u64)
        .checked_add(CHUNK_ENCODING_SIZE)
        .and_then(|n| n.checked_add(data_len))
        .and_then(|n| n.checked_add(CHECKSUM_SIZE))
        .ok_or_else(|| Error::MalformedVarint { context: context() })?;

    let available = len - offset;
    if total > available {
        return Err(Error::Truncated {
            context: context(),
            expected: total,
            available,
        });
    }

    let data = source.range(offset, offset + total)?;
    if data.len() as u64 != total {
        return Err(Error::Truncated {
            context: context(),
            expected: total,
            available: data.len() as u64,
        });
    }

    let body_start = varint_len;
    let body_end = data.len() - CHECKSUM_SIZE as usize;

    let mut stored = [0u8; 4];
    stored.copy_from_slice(&data[body_end..]);
    let expected = u32::from_be_bytes(stored);
    let actual = crc32c::crc32c(&data[body_start..body_end]);
    if expected != actual {
        return Err(Error::ChecksumMismatch {
            context: context(),
            expected,
            actual,
        });
    }

    trace!(offset, total, encoding = data[body_start], "decoded chunk record");

    Ok(ChunkRecord {
        encoding: data[body_start],
        payload: data.slice(body_start + 1..body_end),
    })
}
