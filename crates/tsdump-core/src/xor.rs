//! Chunk Payload Decoding
//!
//! [`ChunkDecoder`] turns a verified [`ChunkRecord`] into a lazy stream of
//! `(timestamp, value)` samples. [`XorDecoder`] handles the XOR float
//! encoding (encoding byte `1`), which is what nearly every block contains.
//!
//! ## XOR Payload
//!
//! ```text
//! ┌────────────┬──────────────────────────────────────────────────────┐
//! │ count (u16)│ bit stream                                           │
//! │ big-endian │ t0 varint, v0 64 bits, Δt1 uvarint, v1 xor, ...       │
//! └────────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Timestamps after the second are delta-of-delta coded:
//!
//! | prefix | payload bits |
//! |--------|--------------|
//! | `0`    | none (dod 0) |
//! | `10`   | 14           |
//! | `110`  | 17           |
//! | `1110` | 20           |
//! | `1111` | 64           |
//!
//! Values are XORed against the previous value; `0` repeats it, `10` reuses
//! the previous leading/trailing zero window, and `11` carries a new window
//! (5 bits leading zeros, 6 bits significant width where 0 means 64).

use crate::codec::ChunkRecord;
use crate::error::{Error, Result};
use crate::varint::{decode_uvarint, decode_varint, MAX_VARINT_LEN};

/// Encoding byte of uncompressed/unknown chunks
pub const ENCODING_NONE: u8 = 0;

/// Encoding byte of XOR float chunks
pub const ENCODING_XOR: u8 = 1;

/// A lazy stream of samples decoded from one chunk.
pub type SampleIter<'a> = Box<dyn Iterator<Item = Result<(i64, f64)>> + 'a>;

/// Decompresses chunk payloads into samples.
pub trait ChunkDecoder {
    fn decode<'a>(&self, record: &'a ChunkRecord) -> Result<SampleIter<'a>>;
}

impl<D: ChunkDecoder + ?Sized> ChunkDecoder for &D {
    fn decode<'a>(&self, record: &'a ChunkRecord) -> Result<SampleIter<'a>> {
        (**self).decode(record)
    }
}

impl<D: ChunkDecoder + ?Sized> ChunkDecoder for Box<D> {
    fn decode<'a>(&self, record: &'a ChunkRecord) -> Result<SampleIter<'a>> {
        (**self).decode(record)
    }
}

/// Decoder for XOR float chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorDecoder;

impl ChunkDecoder for XorDecoder {
    fn decode<'a>(&self, record: &'a ChunkRecord) -> Result<SampleIter<'a>> {
        if record.encoding != ENCODING_XOR {
            return Err(Error::UnsupportedEncoding(record.encoding));
        }
        Ok(Box::new(XorSamples::new(&record.payload)?))
    }
}

/// MSB-first bit cursor over a byte slice.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Result<bool> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or_else(|| Error::CorruptChunk("bit stream ended early".to_string()))?;
        let bit = byte & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    fn read_bits(&mut self, count: u8) -> Result<u64> {
        let mut out = 0u64;
        for _ in 0..count {
            out = (out << 1) | self.read_bit()? as u64;
        }
        Ok(out)
    }

    fn read_varint_bytes(&mut self) -> Result<([u8; MAX_VARINT_LEN], usize)> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for i in 0..MAX_VARINT_LEN {
            buf[i] = self.read_bits(8)? as u8;
            if buf[i] < 0x80 {
                return Ok((buf, i + 1));
            }
        }
        Err(Error::CorruptChunk("unterminated varint in bit stream".to_string()))
    }

    fn read_uvarint(&mut self) -> Result<u64> {
        let (buf, n) = self.read_varint_bytes()?;
        decode_uvarint(&buf[..n])
            .map(|(v, _)| v)
            .ok_or_else(|| Error::CorruptChunk("uvarint overflow in bit stream".to_string()))
    }

    fn read_varint(&mut self) -> Result<i64> {
        let (buf, n) = self.read_varint_bytes()?;
        decode_varint(&buf[..n])
            .map(|(v, _)| v)
            .ok_or_else(|| Error::CorruptChunk("varint overflow in bit stream".to_string()))
    }
}

struct XorSamples<'a> {
    reader: BitReader<'a>,
    total: u16,
    read: u16,
    t: i64,
    t_delta: i64,
    value_bits: u64,
    leading: u8,
    trailing: u8,
    done: bool,
}

impl<'a> XorSamples<'a> {
    fn new(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::CorruptChunk(format!(
                "xor payload of {} bytes has no sample count",
                payload.len()
            )));
        }
        let total = u16::from_be_bytes([payload[0], payload[1]]);
        Ok(Self {
            reader: BitReader::new(&payload[2..]),
            total,
            read: 0,
            t: 0,
            t_delta: 0,
            value_bits: 0,
            leading: 0,
            trailing: 0,
            done: false,
        })
    }

    fn next_sample(&mut self) -> Result<(i64, f64)> {
        match self.read {
            0 => {
                self.t = self.reader.read_varint()?;
                self.value_bits = self.reader.read_bits(64)?;
            }
            1 => {
                self.t_delta = self.reader.read_uvarint()? as i64;
                self.t = self.t.wrapping_add(self.t_delta);
                self.read_value()?;
            }
            _ => {
                let dod = self.read_dod()?;
                self.t_delta = self.t_delta.wrapping_add(dod);
                self.t = self.t.wrapping_add(self.t_delta);
                self.read_value()?;
            }
        }
        self.read += 1;
        Ok((self.t, f64::from_bits(self.value_bits)))
    }

    fn read_dod(&mut self) -> Result<i64> {
        let mut prefix = 0u8;
        while prefix < 4 {
            if !self.reader.read_bit()? {
                break;
            }
            prefix += 1;
        }

        let width = match prefix {
            0 => return Ok(0),
            1 => 14,
            2 => 17,
            3 => 20,
            _ => return Ok(self.reader.read_bits(64)? as i64),
        };

        let bits = self.reader.read_bits(width)?;
        if bits > 1 << (width - 1) {
            Ok(bits as i64 - (1i64 << width))
        } else {
            Ok(bits as i64)
        }
    }

    fn read_value(&mut self) -> Result<()> {
        if !self.reader.read_bit()? {
            return Ok(());
        }

        if self.reader.read_bit()? {
            self.leading = self.reader.read_bits(5)? as u8;
            let mut sigbits = self.reader.read_bits(6)? as u8;
            if sigbits == 0 {
                sigbits = 64;
            }
            self.trailing = 64u8.checked_sub(self.leading + sigbits).ok_or_else(|| {
                Error::CorruptChunk(format!(
                    "xor window of {} leading + {} significant bits exceeds 64",
                    self.leading, sigbits
                ))
            })?;
        }

        let sigbits = 64 - self.leading - self.trailing;
        let bits = self.reader.read_bits(sigbits)?;
        // sigbits == 64 implies trailing == 0
        self.value_bits ^= bits.checked_shl(self.trailing as u32).unwrap_or(0);
        Ok(())
    }
}

impl Iterator for XorSamples<'_> {
    type Item = Result<(i64, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.read >= self.total {
            return None;
        }
        match self.next_sample() {
            Ok(sample) => Some(Ok(sample)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        (0, Some((self.total - self.read) as usize))
    }
}
