/// Magnitude bits of a 32-bit float.
const MAGNITUDE_MASK: i32 = 0x7FFF_FFFF;

/// Encodes a float as an integer that sorts the same way the float does.
///
/// Useful for float-valued tags that the aggregator should be able to compare as integers. Both zeros encode to `0`.
///
/// Returns `None` for NaN, which has no place in the order.
///
/// ```
/// # use metrics_exporter_statshouse::{lex_dec_float, lex_enc_float};
/// let a = lex_enc_float(-1.5).unwrap();
/// let b = lex_enc_float(0.25).unwrap();
/// assert!(a < b);
/// assert_eq!(lex_dec_float(b), 0.25);
/// assert_eq!(lex_enc_float(f32::NAN), None);
/// ```
#[allow(clippy::cast_possible_wrap)]
pub fn lex_enc_float(f: f32) -> Option<i32> {
    if f.is_nan() {
        return None;
    }
    if f == 0.0 {
        return Some(0);
    }

    // Negative floats are sign-magnitude: flip the magnitude so that larger magnitudes sort lower.
    let i = f.to_bits() as i32;
    Some(if i < 0 { i ^ MAGNITUDE_MASK } else { i })
}

/// Decodes an integer produced by [`lex_enc_float`].
pub fn lex_dec_float(i: i32) -> f32 {
    if i == 0 {
        return 0.0;
    }

    let i = if i < 0 { i ^ MAGNITUDE_MASK } else { i };
    f32::from_bits(i as u32)
}
