//! Encoders for building test data.
//!
//! Nothing in the workspace writes blocks; these exist so tests and fixture
//! builders can produce byte-exact chunk records and XOR payloads.

use bytes::BufMut;

use crate::varint::{encode_varint, encode_varint_u64};

/// Encode one chunk record: `uvarint len | encoding | payload | crc32c BE`.
pub fn encode_record(encoding: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 15);
    encode_varint_u64(&mut out, payload.len() as u64);
    let body_start = out.len();
    out.push(encoding);
    out.extend_from_slice(payload);
    let crc = crc32c::crc32c(&out[body_start..]);
    out.put_u32(crc);
    out
}

/// MSB-first bit sink.
#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    used: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bit(&mut self, bit: bool) {
        if self.used == 0 {
            self.out.push(0);
        }
        if bit {
            if let Some(last) = self.out.last_mut() {
                *last |= 0x80 >> self.used;
            }
        }
        self.used = (self.used + 1) % 8;
    }

    pub fn push_bits(&mut self, value: u64, count: u8) {
        for i in (0..count).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.push_bits(byte as u64, 8);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

/// Builds an XOR chunk payload the way block writers lay it out.
#[derive(Debug)]
pub struct XorEncoder {
    bits: BitWriter,
    count: u16,
    t: i64,
    t_delta: i64,
    value_bits: u64,
    leading: u8,
    trailing: u8,
}

impl Default for XorEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl XorEncoder {
    pub fn new() -> Self {
        Self {
            bits: BitWriter::new(),
            count: 0,
            t: 0,
            t_delta: 0,
            value_bits: 0,
            leading: u8::MAX,
            trailing: 0,
        }
    }

    pub fn append(&mut self, t: i64, v: f64) {
        match self.count {
            0 => {
                let mut buf = Vec::new();
                encode_varint(&mut buf, t);
                buf.iter().for_each(|&b| self.bits.push_byte(b));
                self.bits.push_bits(v.to_bits(), 64);
            }
            1 => {
                let delta = t - self.t;
                let mut buf = Vec::new();
                encode_varint_u64(&mut buf, delta as u64);
                buf.iter().for_each(|&b| self.bits.push_byte(b));
                self.write_value(v);
                self.t_delta = delta;
            }
            _ => {
                let delta = t - self.t;
                let dod = delta - self.t_delta;
                self.write_dod(dod);
                self.write_value(v);
                self.t_delta = delta;
            }
        }
        self.t = t;
        self.value_bits = v.to_bits();
        self.count += 1;
    }

    /// Payload bytes: big-endian sample count followed by the bit stream.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u16(self.count);
        out.extend_from_slice(&self.bits.into_bytes());
        out
    }

    fn write_dod(&mut self, dod: i64) {
        let fits = |width: u32| -((1i64 << (width - 1)) - 1) <= dod && dod <= 1i64 << (width - 1);
        if dod == 0 {
            self.bits.push_bit(false);
        } else if fits(14) {
            self.bits.push_bits(0b10, 2);
            self.bits.push_bits(dod as u64, 14);
        } else if fits(17) {
            self.bits.push_bits(0b110, 3);
            self.bits.push_bits(dod as u64, 17);
        } else if fits(20) {
            self.bits.push_bits(0b1110, 4);
            self.bits.push_bits(dod as u64, 20);
        } else {
            self.bits.push_bits(0b1111, 4);
            self.bits.push_bits(dod as u64, 64);
        }
    }

    fn write_value(&mut self, v: f64) {
        let delta = v.to_bits() ^ self.value_bits;
        if delta == 0 {
            self.bits.push_bit(false);
            return;
        }
        self.bits.push_bit(true);

        let leading = (delta.leading_zeros() as u8).min(31);
        let trailing = delta.trailing_zeros() as u8;

        if self.leading != u8::MAX && leading >= self.leading && trailing >= self.trailing {
            self.bits.push_bit(false);
            let sigbits = 64 - self.leading - self.trailing;
            self.bits.push_bits(delta >> self.trailing, sigbits);
            return;
        }

        self.leading = leading;
        self.trailing = trailing;
        let sigbits = 64 - leading - trailing;
        self.bits.push_bit(true);
        self.bits.push_bits(leading as u64, 5);
        // 64 wraps to 0 in six bits
        self.bits.push_bits(sigbits as u64, 6);
        self.bits.push_bits(delta >> trailing, sigbits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_writer_packs_msb_first() {
        let mut w = BitWriter::new();
        w.push_bits(0b101, 3);
        w.push_byte(0xFF);
        assert_eq!(w.into_bytes(), vec![0b1011_1111, 0b1110_0000]);
    }

    #[test]
    fn test_record_layout() {
        let rec = encode_record(1, &[0xAB, 0xCD]);
        assert_eq!(rec[0], 2);
        assert_eq!(rec[1], 1);
        assert_eq!(&rec[2..4], &[0xAB, 0xCD]);
        assert_eq!(rec.len(), 8);
        let crc = u32::from_be_bytes([rec[4], rec[5], rec[6], rec[7]]);
        assert_eq!(crc, crc32c::crc32c(&[1, 0xAB, 0xCD]));
    }

    #[test]
    fn test_xor_payload_starts_with_count() {
        let mut enc = XorEncoder::new();
        enc.append(1000, 1.0);
        enc.append(2000, 1.0);
        let payload = enc.finish();
        assert_eq!(&payload[..2], &[0, 2]);
    }
}
