//! Scalar encoders for the TL wire format.
//!
//! Everything is little-endian. Strings are length-prefixed and zero-padded so that the next field always starts on a
//! 4-byte boundary.

use bytes::BufMut as _;

/// Maximum number of bytes of a string that will be encoded. Longer input is silently truncated.
pub const MAX_STRING_LEN: usize = 128;

/// Strings up to this length use a single length byte as their prefix.
pub const TINY_STRING_LEN: usize = 253;

/// Marker byte for the 4-byte ("big") string length prefix.
const BIG_STRING_MARKER: u32 = 0xFE;

/// Appends a fixed-width 32-bit unsigned integer.
pub fn pack_fixed32(buf: &mut Vec<u8>, value: u32) {
    buf.put_u32_le(value);
}

/// Appends a 64-bit IEEE-754 double.
pub fn pack_fixed64_float(buf: &mut Vec<u8>, value: f64) {
    buf.put_f64_le(value);
}

/// Appends a fixed-width 64-bit unsigned integer.
pub fn pack_fixed64_uint(buf: &mut Vec<u8>, value: u64) {
    buf.put_u64_le(value);
}

/// Appends a short string, truncated to [`MAX_STRING_LEN`] bytes.
///
/// Truncation happens at the byte level and may cut a multi-byte UTF-8 sequence in half; the aggregator treats names
/// and tag values as opaque bytes.
pub fn pack_short_string(buf: &mut Vec<u8>, s: &[u8]) {
    let s = &s[..s.len().min(MAX_STRING_LEN)];
    pack_string_untruncated(buf, s);
}

// The 4-byte prefix is only used above `TINY_STRING_LEN`, which `MAX_STRING_LEN` currently rules out.
fn pack_string_untruncated(buf: &mut Vec<u8>, s: &[u8]) {
    let prefix_len = if s.len() <= TINY_STRING_LEN {
        buf.put_u8(s.len() as u8);
        1
    } else {
        buf.put_u32_le(((s.len() as u32) << 8) | BIG_STRING_MARKER);
        4
    };

    buf.put_slice(s);
    buf.put_bytes(0, padding_len(prefix_len + s.len()));
}

/// Returns the number of zero bytes needed to pad `len` up to a multiple of four.
const fn padding_len(len: usize) -> usize {
    (4 - len % 4) % 4
}
