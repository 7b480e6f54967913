//! Block Index Reader (format version 2)
//!
//! Reads the label index of a block through any [`RangedByteSource`], so a
//! remote index costs one HEAD plus a handful of ranged GETs instead of a
//! full download.
//!
//! ## File Layout
//!
//! ```text
//! ┌───────────────────────────────┐ 0
//! │ magic 0xBAAAD700 │ version 2  │
//! ├───────────────────────────────┤
//! │ symbol table                  │ ◄── loaded at open
//! ├───────────────────────────────┤
//! │ series (16-byte aligned)      │ ◄── read per series
//! ├───────────────────────────────┤
//! │ label indices (unused)        │
//! ├───────────────────────────────┤
//! │ postings lists                │ ◄── read per lookup
//! ├───────────────────────────────┤
//! │ label offset table (unused)   │
//! ├───────────────────────────────┤
//! │ postings offset table         │ ◄── loaded at open
//! ├───────────────────────────────┤
//! │ TOC: 6 × u64 BE + CRC-32C     │ ◄── last 52 bytes
//! └───────────────────────────────┘
//! ```
//!
//! Tables are framed as `u32 BE length | content | CRC-32C(content)`. Series
//! entries use a uvarint length instead and live at byte `ref * 16`.
//!
//! ## Series Entry
//!
//! ```text
//! uvarint #labels, then per label: uvarint name symbol, uvarint value symbol
//! uvarint #chunks
//!   first: varint mint, uvarint (maxt - mint), uvarint ref
//!   rest:  uvarint (mint - prev maxt), uvarint (maxt - mint), varint ref delta
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::debug;
use tsdump_core::varint::{decode_uvarint, decode_varint, MAX_VARINT_LEN};
use tsdump_core::{
    ChunkMeta, ChunkRef, Error, IndexSource, Label, LabelSet, RangedByteSource, Result, SeriesRef,
};

pub const INDEX_MAGIC: u32 = 0xBAAA_D700;
pub const INDEX_VERSION: u8 = 2;

const HEADER_LEN: u64 = 5;
const TOC_LEN: u64 = 6 * 8 + 4;
const SERIES_ALIGNMENT: u64 = 16;

/// Section offsets from the table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toc {
    pub symbols: u64,
    pub series: u64,
    pub label_indices: u64,
    pub label_indices_table: u64,
    pub postings: u64,
    pub postings_table: u64,
}

/// Cursor over the content of one table or entry.
struct Decbuf<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> Decbuf<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    fn corrupt(&self, detail: &str) -> Error {
        Error::InvalidIndex(format!("{}: {}", self.what, detail))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(self.corrupt("unexpected end of data"));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn be_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn uvarint(&mut self) -> Result<u64> {
        let (v, n) = decode_uvarint(self.buf).ok_or_else(|| self.corrupt("malformed uvarint"))?;
        self.buf = &self.buf[n..];
        Ok(v)
    }

    fn varint(&mut self) -> Result<i64> {
        let (v, n) = decode_varint(self.buf).ok_or_else(|| self.corrupt("malformed varint"))?;
        self.buf = &self.buf[n..];
        Ok(v)
    }

    fn uvarint_str(&mut self) -> Result<&'a str> {
        let len = self.uvarint()?;
        let len = usize::try_from(len).map_err(|_| self.corrupt("string length overflow"))?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|_| self.corrupt("invalid utf-8"))
    }
}

/// Lazy reader for a version 2 block index.
pub struct IndexReader<S> {
    source: Option<S>,
    toc: Toc,
    symbols: Vec<String>,
    postings_offsets: BTreeMap<String, BTreeMap<String, u64>>,
}

impl<S: RangedByteSource> IndexReader<S> {
    /// Validate the header and TOC and load the symbol and postings offset tables.
    pub fn open(source: S) -> Result<Self> {
        let len = source.len();
        if len < HEADER_LEN + TOC_LEN {
            return Err(Error::InvalidIndex(format!(
                "{} is {} bytes, too small for an index",
                source.describe(),
                len
            )));
        }

        let header = source.range(0, HEADER_LEN)?;
        let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if magic != INDEX_MAGIC {
            return Err(Error::InvalidIndex(format!(
                "{}: bad magic {:#010x}",
                source.describe(),
                magic
            )));
        }
        if header[4] != INDEX_VERSION {
            return Err(Error::InvalidIndex(format!(
                "{}: unsupported version {}",
                source.describe(),
                header[4]
            )));
        }

        let toc = read_toc(&source)?;
        let symbols = read_symbols(&source, toc.symbols)?;
        let postings_offsets = read_postings_offsets(&source, toc.postings_table)?;

        debug!(
            index = %source.describe(),
            symbols = symbols.len(),
            label_names = postings_offsets.len(),
            "opened index"
        );

        Ok(Self {
            source: Some(source),
            toc,
            symbols,
            postings_offsets,
        })
    }

    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Label names that have postings, sorted.
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.postings_offsets
            .keys()
            .filter(|name| !name.is_empty())
            .map(String::as_str)
    }

    fn source(&self) -> Result<&S> {
        self.source
            .as_ref()
            .ok_or_else(|| Error::InvalidIndex("index is closed".to_string()))
    }

    fn symbol(&self, idx: u64) -> Result<&str> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.symbols.get(i))
            .map(String::as_str)
            .ok_or_else(|| Error::InvalidIndex(format!("symbol {} out of range", idx)))
    }
}

impl<S: RangedByteSource> IndexSource for IndexReader<S> {
    fn postings(&self, name: &str, value: &str) -> Result<Vec<SeriesRef>> {
        let Some(offset) = self
            .postings_offsets
            .get(name)
            .and_then(|values| values.get(value))
        else {
            return Ok(Vec::new());
        };

        let source = self.source()?;
        let content = read_table(source, *offset, "postings list")?;
        let mut d = Decbuf::new(&content, "postings list");
        let count = d.be_u32()?;

        let mut refs = Vec::with_capacity((count as usize).min(content.len() / 4));
        for _ in 0..count {
            refs.push(d.be_u32()? as SeriesRef);
        }
        debug!(name, value, count, "read postings");
        Ok(refs)
    }

    fn series(&self, series: SeriesRef) -> Result<(LabelSet, Vec<ChunkMeta>)> {
        let source = self.source()?;
        let offset = series
            .checked_mul(SERIES_ALIGNMENT)
            .ok_or_else(|| Error::InvalidIndex(format!("series ref {} overflows", series)))?;
        let content = read_uvarint_framed(source, offset, "series")?;
        let mut d = Decbuf::new(&content, "series");

        let label_count = d.uvarint()?;
        let mut labels = LabelSet::new();
        for _ in 0..label_count {
            let name = self.symbol(d.uvarint()?)?;
            let value = self.symbol(d.uvarint()?)?;
            labels.push(Label::new(name, value));
        }

        let chunk_count = d.uvarint()?;
        let mut metas = Vec::with_capacity(chunk_count.min(1024) as usize);
        if chunk_count > 0 {
            let min_time = d.varint()?;
            let max_time = min_time.wrapping_add(d.uvarint()? as i64);
            let mut chunk_ref = d.uvarint()?;
            metas.push(ChunkMeta::new(ChunkRef::from_raw(chunk_ref), min_time, max_time));

            let mut prev_max = max_time;
            for _ in 1..chunk_count {
                let min_time = prev_max.wrapping_add(d.uvarint()? as i64);
                let max_time = min_time.wrapping_add(d.uvarint()? as i64);
                chunk_ref = chunk_ref.wrapping_add(d.varint()? as u64);
                metas.push(ChunkMeta::new(ChunkRef::from_raw(chunk_ref), min_time, max_time));
                prev_max = max_time;
            }
        }

        Ok((labels, metas))
    }

    /// Prometheus indexes list every series under the empty label pair.
    fn all_postings_key(&self) -> (String, String) {
        (String::new(), String::new())
    }

    fn close(&mut self) {
        self.source = None;
    }
}

fn be_u64(b: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&b[..8]);
    u64::from_be_bytes(arr)
}

fn verify_crc(what: &str, content: &[u8], stored: &[u8]) -> Result<()> {
    let expected = u32::from_be_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let actual = crc32c::crc32c(content);
    if expected != actual {
        return Err(Error::ChecksumMismatch {
            context: what.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn read_toc<S: RangedByteSource>(source: &S) -> Result<Toc> {
    let len = source.len();
    let data = source.range(len - TOC_LEN, len)?;
    verify_crc("index TOC", &data[..48], &data[48..])?;

    let toc = Toc {
        symbols: be_u64(&data[0..]),
        series: be_u64(&data[8..]),
        label_indices: be_u64(&data[16..]),
        label_indices_table: be_u64(&data[24..]),
        postings: be_u64(&data[32..]),
        postings_table: be_u64(&data[40..]),
    };
    if toc.symbols >= len - TOC_LEN || toc.postings_table >= len - TOC_LEN {
        return Err(Error::InvalidIndex(format!("TOC points past end: {:?}", toc)));
    }
    Ok(toc)
}

/// Read a `u32 length | content | crc` table and return its verified content.
fn read_table<S: RangedByteSource>(source: &S, offset: u64, what: &'static str) -> Result<Bytes> {
    let len_end = offset
        .checked_add(4)
        .ok_or_else(|| Error::InvalidIndex(format!("{} offset overflows", what)))?;
    let len_bytes = source.range(offset, len_end)?;
    let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as u64;

    let data = source.range(len_end, len_end + len + 4)?;
    let (content, crc) = data.split_at(len as usize);
    verify_crc(what, content, crc)?;
    Ok(data.slice(..len as usize))
}

/// Read a `uvarint length | content | crc` entry and return its verified content.
fn read_uvarint_framed<S: RangedByteSource>(
    source: &S,
    offset: u64,
    what: &'static str,
) -> Result<Bytes> {
    let total = source.len();
    if offset >= total {
        return Err(Error::OutOfBounds {
            context: format!("{} {} @ {}", source.describe(), what, offset),
            start: offset,
            end: offset,
            len: total,
        });
    }

    let window = source.range(offset, total.min(offset + MAX_VARINT_LEN as u64))?;
    let (len, n) = decode_uvarint(&window)
        .ok_or_else(|| Error::InvalidIndex(format!("{} @ {}: malformed length", what, offset)))?;

    let start = offset + n as u64;
    let end = start
        .checked_add(len)
        .and_then(|e| e.checked_add(4))
        .ok_or_else(|| Error::InvalidIndex(format!("{} @ {}: length overflows", what, offset)))?;
    let data = source.range(start, end)?;
    let (content, crc) = data.split_at(len as usize);
    verify_crc(what, content, crc)?;
    Ok(data.slice(..len as usize))
}

fn read_symbols<S: RangedByteSource>(source: &S, offset: u64) -> Result<Vec<String>> {
    let content = read_table(source, offset, "symbol table")?;
    let mut d = Decbuf::new(&content, "symbol table");
    let count = d.be_u32()?;

    let mut symbols = Vec::with_capacity(count.min(1 << 16) as usize);
    for _ in 0..count {
        symbols.push(d.uvarint_str()?.to_string());
    }
    Ok(symbols)
}

fn read_postings_offsets<S: RangedByteSource>(
    source: &S,
    offset: u64,
) -> Result<BTreeMap<String, BTreeMap<String, u64>>> {
    let content = read_table(source, offset, "postings offset table")?;
    let mut d = Decbuf::new(&content, "postings offset table");
    let count = d.be_u32()?;

    let mut table: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for _ in 0..count {
        let keys = d.uvarint()?;
        if keys != 2 {
            return Err(Error::InvalidIndex(format!(
                "postings offset entry with {} keys",
                keys
            )));
        }
        let name = d.uvarint_str()?.to_string();
        let value = d.uvarint_str()?.to_string();
        let offset = d.uvarint()?;
        table.entry(name).or_default().insert(value, offset);
    }
    Ok(table)
}
