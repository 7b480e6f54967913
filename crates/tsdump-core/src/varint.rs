//! Variable-length Integer Encoding (Varint)
//!
//! Chunk records and index entries use the LEB128-style varints of the block
//! format:
//! - Each byte carries 7 bits of data and 1 continuation bit
//! - A u64 needs at most [`MAX_VARINT_LEN`] bytes
//! - Signed values are ZigZag-mapped first (0 → 0, -1 → 1, 1 → 2, ...)
//!
//! ## Bounded Decoding
//!
//! Data read from storage is untrusted. The decoders here never panic and
//! never look past the slice they are given: an unterminated or overflowing
//! varint decodes to `None`, and the caller turns that into a format error
//! with its own context.
//!
//! ## Usage
//! ```ignore
//! let (data_len, n) = decode_uvarint(&header).ok_or(...)?;
//! ```

use bytes::BufMut;

/// Longest possible encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode a signed integer as a varint (ZigZag encoding)
pub fn encode_varint(buf: &mut impl BufMut, value: i64) {
    let unsigned = ((value << 1) ^ (value >> 63)) as u64;

    encode_varint_u64(buf, unsigned);
}

/// Encode an unsigned integer as a varint
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode an unsigned varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// varint is unterminated within `buf` or does not fit in 64 bits.
pub fn decode_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return None;
        }
        if byte < 0x80 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return None;
            }
            return Some((value | (byte as u64) << shift, i + 1));
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
    }

    None
}

/// Decode a ZigZag-encoded signed varint from the front of `buf`.
pub fn decode_varint(buf: &[u8]) -> Option<(i64, usize)> {
    let (unsigned, n) = decode_uvarint(buf)?;

    let value = (unsigned >> 1) as i64;
    if (unsigned & 1) != 0 {
        Some((!value, n))
    } else {
        Some((value, n))
    }
}
