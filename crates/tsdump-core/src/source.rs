//! Ranged Byte Sources
//!
//! A [`RangedByteSource`] is a lazily-read, fixed-size byte sequence: a local
//! file, a remote object, or a buffer already in memory. Nothing is read until
//! [`RangedByteSource::range`] is called, and nothing is cached between calls.
//!
//! ## Contract
//!
//! - `len()` is resolved once, when the source is opened
//! - `range(start, end)` returns exactly `end - start` bytes covering
//!   `[start, end)`, or an error
//! - `start > end` or `end > len()` is [`Error::OutOfBounds`]
//!
//! Backends live in `tsdump-storage`; [`MemorySource`] lives here because the
//! codec and decoders are tested against it.

use bytes::Bytes;

use crate::error::{Error, Result};

pub trait RangedByteSource {
    /// Total addressable size in bytes
    fn len(&self) -> u64;

    /// Read `[start, end)`.
    fn range(&self, start: u64, end: u64) -> Result<Bytes>;

    /// Human-readable name (path or object key) used in error context
    fn describe(&self) -> String;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: RangedByteSource + ?Sized> RangedByteSource for &S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn range(&self, start: u64, end: u64) -> Result<Bytes> {
        (**self).range(start, end)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: RangedByteSource + ?Sized> RangedByteSource for Box<S> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn range(&self, start: u64, end: u64) -> Result<Bytes> {
        (**self).range(start, end)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Validate a requested range against a source length.
pub fn check_range(describe: impl FnOnce() -> String, start: u64, end: u64, len: u64) -> Result<()> {
    if start > end || end > len {
        return Err(Error::OutOfBounds {
            context: describe(),
            start,
            end,
            len,
        });
    }
    Ok(())
}

/// A source over bytes that are already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Bytes,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl RangedByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn range(&self, start: u64, end: u64) -> Result<Bytes> {
        check_range(|| self.name.clone(), start, end, self.len())?;
        Ok(self.data.slice(start as usize..end as usize))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
