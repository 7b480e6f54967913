//! Error Types for tsdb-dump
//!
//! Every fallible operation in the workspace returns [`Result<T>`], aliased to
//! `Result<T, Error>`, so errors propagate with `?` from the byte sources all
//! the way up to the CLI.
//!
//! ## Error Categories
//!
//! Each variant belongs to exactly one [`ErrorKind`]:
//!
//! ### Configuration
//! Bad filter or label input, unknown output format, unresolvable block
//! location. Reported before any I/O happens.
//!
//! ### Transport
//! Backend I/O failure other than a timeout: network, permission, object or
//! file not found, sink write failure. Carries the object/segment context.
//!
//! ### Timeout
//! A bounded remote operation exceeded its deadline. This is the only
//! retryable kind; nothing in this workspace retries by itself.
//!
//! ### Format
//! Malformed varint, truncated record, checksum mismatch, out-of-range
//! reference, unsupported encoding, corrupt index or chunk payload. Always
//! fatal: a corrupt chunk is never treated as "no samples".
//!
//! ## Example
//! ```ignore
//! match store.chunk(chunk_ref) {
//!     Ok(record) => decode(record),
//!     Err(e) if e.is_retryable() => retry_whole_dump(),
//!     Err(e) => return Err(e),
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::chunk_ref::ChunkRef;

/// Coarse classification used by callers to decide what to do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Timeout,
    Format,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported block location scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid labels: {0}")]
    InvalidLabels(String),

    #[error("IO error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error ({context}): {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Sink write failed: {0}")]
    Sink(String),

    #[error("Timed out after {after:?} ({context})")]
    Timeout { context: String, after: Duration },

    #[error("Malformed varint ({context})")]
    MalformedVarint { context: String },

    #[error("Truncated record ({context}): need {expected} bytes, {available} available")]
    Truncated {
        context: String,
        expected: u64,
        available: u64,
    },

    #[error("Checksum mismatch ({context}): stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        context: String,
        expected: u32,
        actual: u32,
    },

    #[error("Range {start}..{end} out of bounds for {len} bytes ({context})")]
    OutOfBounds {
        context: String,
        start: u64,
        end: u64,
        len: u64,
    },

    #[error("Unsupported chunk encoding: {0}")]
    UnsupportedEncoding(u8),

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Corrupt chunk: {0}")]
    CorruptChunk(String),

    #[error("Series {series}, chunk {chunk_ref}: {source}")]
    Chunk {
        series: String,
        chunk_ref: ChunkRef,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::UnsupportedScheme(_) | Error::InvalidLabels(_) => {
                ErrorKind::Configuration
            }
            Error::Io { .. } | Error::Transport { .. } | Error::Sink(_) => ErrorKind::Transport,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::MalformedVarint { .. }
            | Error::Truncated { .. }
            | Error::ChecksumMismatch { .. }
            | Error::OutOfBounds { .. }
            | Error::UnsupportedEncoding(_)
            | Error::InvalidIndex(_)
            | Error::CorruptChunk(_) => ErrorKind::Format,
            Error::Chunk { source, .. } => source.kind(),
        }
    }

    /// Only deadline expiry is worth retrying; everything else fails the same way twice.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn transport<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Attach the series and chunk that were being materialized.
    pub fn in_chunk(self, series: impl Into<String>, chunk_ref: ChunkRef) -> Self {
        Error::Chunk {
            series: series.into(),
            chunk_ref,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::UnsupportedScheme("gs".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::io("seg", std::io::Error::other("boom")).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            Error::MalformedVarint {
                context: "seg".into()
            }
            .kind(),
            ErrorKind::Format
        );
        assert_eq!(Error::UnsupportedEncoding(9).kind(), ErrorKind::Format);
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        let timeout = Error::Timeout {
            context: "GET chunks/000000".into(),
            after: Duration::from_secs(300),
        };
        assert!(timeout.is_retryable());
        assert!(!Error::transport("GET", std::io::Error::other("reset")).is_retryable());
        assert!(!Error::CorruptChunk("bad".into()).is_retryable());
    }

    #[test]
    fn test_chunk_context_delegates_kind() {
        let inner = Error::Timeout {
            context: "GET".into(),
            after: Duration::from_secs(1),
        };
        let wrapped = inner.in_chunk("{__name__=\"up\"}", ChunkRef::new(1, 8));
        assert_eq!(wrapped.kind(), ErrorKind::Timeout);
        assert!(wrapped.is_retryable());

        let msg = wrapped.to_string();
        assert!(msg.contains("up"));
        assert!(msg.contains("segment 1"));
    }
}
