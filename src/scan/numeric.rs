//! Fixed-width numeric decoding with a monetary plausibility filter.
//!
//! A byte position in an undocumented page may hold a float, a scaled
//! integer, or nothing numeric at all. Each encoding is tried on its own
//! and kept only if the result looks like money.

use byteorder::{ByteOrder, LittleEndian};
use rust_decimal::Decimal;

use crate::records::to_money;

/// Smallest magnitude accepted as money (exclusive)
pub const MIN_MAGNITUDE: f64 = 0.01;

/// Largest magnitude accepted from a float decode (exclusive)
pub const MAX_FLOAT_MAGNITUDE: f64 = 1e12;

/// Largest magnitude accepted from a scaled-integer decode (exclusive)
pub const MAX_SCALED_MAGNITUDE: f64 = 1e8;

/// Magnitudes above this are checked for power-of-two artifacts
pub const POW2_CHECK_ABOVE: f64 = 100.0;

/// Distance in log2 space under which a value counts as a power of two
pub const POW2_TOLERANCE: f64 = 0.01;

/// How the bytes at an offset were read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericEncoding {
    /// 8-byte little-endian IEEE 754 double
    Float64,
    /// 8-byte little-endian signed integer, cents
    Int64Cents,
    /// 4-byte little-endian signed integer, cents
    Int32Cents,
    /// 4-byte little-endian signed integer, ten-thousandths
    Int32Basis,
}

impl NumericEncoding {
    /// Decode order used by [`try_decode`]
    pub const ORDER: [NumericEncoding; 4] = [
        NumericEncoding::Float64,
        NumericEncoding::Int64Cents,
        NumericEncoding::Int32Cents,
        NumericEncoding::Int32Basis,
    ];

    pub fn width(self) -> usize {
        match self {
            NumericEncoding::Float64 | NumericEncoding::Int64Cents => 8,
            NumericEncoding::Int32Cents | NumericEncoding::Int32Basis => 4,
        }
    }

    pub fn max_magnitude(self) -> f64 {
        match self {
            NumericEncoding::Float64 => MAX_FLOAT_MAGNITUDE,
            _ => MAX_SCALED_MAGNITUDE,
        }
    }
}

/// A decode at `offset` that passed the plausibility filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericCandidate {
    pub offset: usize,
    pub value: f64,
    pub encoding: NumericEncoding,
}

/// Read the raw value at `offset` without any filtering.
/// `None` when the field would run past the end of the buffer.
pub fn decode_at(buf: &[u8], offset: usize, encoding: NumericEncoding) -> Option<f64> {
    let bytes = buf.get(offset..offset.checked_add(encoding.width())?)?;
    let value = match encoding {
        NumericEncoding::Float64 => LittleEndian::read_f64(bytes),
        NumericEncoding::Int64Cents => LittleEndian::read_i64(bytes) as f64 / 100.0,
        NumericEncoding::Int32Cents => LittleEndian::read_i32(bytes) as f64 / 100.0,
        NumericEncoding::Int32Basis => LittleEndian::read_i32(bytes) as f64 / 10_000.0,
    };
    Some(value)
}

/// Round binary magnitudes such as 1024.0 are almost always padding or
/// page-size fields, not money.
pub fn near_power_of_two(magnitude: f64) -> bool {
    let exponent = magnitude.log2();
    (exponent - exponent.round()).abs() < POW2_TOLERANCE
}

/// Monetary plausibility filter
pub fn is_plausible(value: f64, encoding: NumericEncoding) -> bool {
    if !value.is_finite() {
        return false;
    }
    let magnitude = value.abs();
    if magnitude <= MIN_MAGNITUDE || magnitude >= encoding.max_magnitude() {
        return false;
    }
    !(magnitude > POW2_CHECK_ABOVE && near_power_of_two(magnitude))
}

/// Every plausible decode at `offset`, in [`NumericEncoding::ORDER`]
pub fn try_decode(buf: &[u8], offset: usize) -> Vec<NumericCandidate> {
    NumericEncoding::ORDER
        .into_iter()
        .filter_map(|encoding| {
            let value = decode_at(buf, offset, encoding)?;
            is_plausible(value, encoding).then_some(NumericCandidate {
                offset,
                value,
                encoding,
            })
        })
        .collect()
}

fn plausible_float(buf: &[u8], offset: usize) -> Option<f64> {
    decode_at(buf, offset, NumericEncoding::Float64)
        .filter(|&v| is_plausible(v, NumericEncoding::Float64))
}

/// First plausible float starting in `[start, start + max_distance)`,
/// with its offset.
pub fn find_forward(buf: &[u8], start: usize, max_distance: usize) -> Option<(usize, f64)> {
    let end = start.saturating_add(max_distance).min(buf.len());
    (start..end).find_map(|offset| plausible_float(buf, offset).map(|v| (offset, v)))
}

/// First plausible float lying wholly inside `[start - max_distance, start)`,
/// nearest to `start` first, with its offset.
pub fn find_backward(buf: &[u8], start: usize, max_distance: usize) -> Option<(usize, f64)> {
    let start = start.min(buf.len());
    let width = NumericEncoding::Float64.width();
    let lowest = start.saturating_sub(max_distance);
    let highest = start.checked_sub(width)?;
    if highest < lowest {
        return None;
    }
    (lowest..=highest)
        .rev()
        .find_map(|offset| plausible_float(buf, offset).map(|v| (offset, v)))
}

/// Like [`find_forward`], but prefers a value that is repeated in the
/// 8 bytes right after it.
///
/// Windows straddling the front of a double often decode to small plausible
/// artifacts; a straddling window is never followed by its own exact copy,
/// while a redundantly written value is. Falls back to the first plausible
/// value when nothing in the window is confirmed.
pub fn find_forward_confirmed(
    buf: &[u8],
    start: usize,
    max_distance: usize,
) -> Option<(usize, f64)> {
    let end = start.saturating_add(max_distance).min(buf.len());
    let mut first = None;

    for offset in start..end {
        let Some(value) = plausible_float(buf, offset) else {
            continue;
        };
        if decode_at(buf, offset + 8, NumericEncoding::Float64) == Some(value) {
            return Some((offset, value));
        }
        first.get_or_insert((offset, value));
    }

    first
}

fn in_range(value: f64) -> bool {
    value.is_finite() && value.abs() < NumericEncoding::Float64.max_magnitude()
}

/// Float written right after the first `marker` found in
/// `[start, start + window)`, with its offset. Zero is accepted.
pub fn find_marked(
    buf: &[u8],
    start: usize,
    window: usize,
    marker: &[u8],
) -> Option<(usize, f64)> {
    let end = start.saturating_add(window).min(buf.len());
    let pos = buf
        .get(start..end)?
        .windows(marker.len())
        .position(|w| w == marker)?;
    let at = start + pos + marker.len();
    decode_at(buf, at, NumericEncoding::Float64)
        .filter(|&v| in_range(v))
        .map(|v| (at, v))
}

/// Float at `offset` when the next 8 bytes hold the same value.
/// Zero is accepted.
pub fn repeated_at(buf: &[u8], offset: usize) -> Option<f64> {
    let value = decode_at(buf, offset, NumericEncoding::Float64).filter(|&v| in_range(v))?;
    (decode_at(buf, offset + 8, NumericEncoding::Float64) == Some(value)).then_some(value)
}

/// Forward float scan, rounded to cents
pub fn scan_forward(buf: &[u8], start: usize, max_distance: usize) -> Option<Decimal> {
    find_forward(buf, start, max_distance).map(|(_, v)| to_money(v))
}

/// Backward float scan, rounded to cents
pub fn scan_backward(buf: &[u8], start: usize, max_distance: usize) -> Option<Decimal> {
    find_backward(buf, start, max_distance).map(|(_, v)| to_money(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_bytes(value: f64) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        LittleEndian::write_f64(&mut bytes, value);
        bytes
    }

    #[test]
    fn rejects_power_of_two_artifacts() {
        assert!(!is_plausible(1024.0, NumericEncoding::Float64));
        assert!(!is_plausible(2048.0, NumericEncoding::Float64));
        assert!(!is_plausible(-4096.0, NumericEncoding::Float64));
    }

    #[test]
    fn accepts_ordinary_amounts() {
        assert!(is_plausible(1234.56, NumericEncoding::Float64));
        assert!(is_plausible(50.00, NumericEncoding::Float64));
        assert!(is_plausible(1000.00, NumericEncoding::Float64));
        // Small powers of two are allowed
        assert!(is_plausible(64.0, NumericEncoding::Float64));
    }

    #[test]
    fn magnitude_bounds() {
        assert!(!is_plausible(0.01, NumericEncoding::Float64));
        assert!(!is_plausible(0.0, NumericEncoding::Float64));
        assert!(!is_plausible(f64::NAN, NumericEncoding::Float64));
        assert!(!is_plausible(f64::INFINITY, NumericEncoding::Float64));
        assert!(!is_plausible(2e12, NumericEncoding::Float64));
        assert!(is_plausible(5e9, NumericEncoding::Float64));
        assert!(!is_plausible(5e9, NumericEncoding::Int32Cents));
    }

    #[test]
    fn decodes_each_encoding() {
        let mut buf = vec![0u8; 16];
        LittleEndian::write_i32(&mut buf[0..4], 123_456);
        let candidates = try_decode(&buf, 0);

        let cents = candidates
            .iter()
            .find(|c| c.encoding == NumericEncoding::Int32Cents)
            .map(|c| c.value);
        let basis = candidates
            .iter()
            .find(|c| c.encoding == NumericEncoding::Int32Basis)
            .map(|c| c.value);
        assert_eq!(cents, Some(1234.56));
        assert_eq!(basis, Some(12.3456));
    }

    #[test]
    fn decode_past_end_is_none() {
        assert_eq!(decode_at(&[0u8; 6], 0, NumericEncoding::Float64), None);
        assert_eq!(decode_at(&[0u8; 6], usize::MAX, NumericEncoding::Int32Cents), None);
        assert!(try_decode(&[0u8; 3], 0).is_empty());
    }

    #[test]
    fn forward_scan_skips_padding() {
        let mut buf = vec![0u8; 40];
        buf[21..29].copy_from_slice(&f64_bytes(50.0));

        assert_eq!(find_forward(&buf, 4, 32), Some((21, 50.0)));
        assert_eq!(scan_forward(&buf, 4, 32), Some(Decimal::new(50, 0)));
        // Window ends before the value
        assert_eq!(scan_forward(&buf, 4, 17), None);
    }

    #[test]
    fn straddling_window_loses_to_confirmed_copy() {
        // 250.0 seen two bytes early decodes as -2.0 / 2.0 style noise
        let mut buf = vec![0u8; 64];
        buf[16..24].copy_from_slice(&f64_bytes(250.0));
        buf[24..32].copy_from_slice(&f64_bytes(250.0));

        let (offset, value) = find_forward(&buf, 0, 40).unwrap();
        assert!(offset < 16 && value < 4.0);

        assert_eq!(find_forward_confirmed(&buf, 0, 40), Some((16, 250.0)));
    }

    #[test]
    fn confirmed_scan_falls_back_to_first() {
        let mut buf = vec![0u8; 32];
        buf[8..16].copy_from_slice(&f64_bytes(12.5));
        assert_eq!(find_forward_confirmed(&buf, 0, 24), Some((8, 12.5)));
    }

    #[test]
    fn backward_scan_finds_nearest() {
        let mut buf = vec![0u8; 64];
        buf[0..8].copy_from_slice(&f64_bytes(12.5));
        buf[20..28].copy_from_slice(&f64_bytes(75.5));

        assert_eq!(find_backward(&buf, 40, 40), Some((20, 75.5)));
        assert_eq!(scan_backward(&buf, 20, 20), Some(Decimal::new(125, 1)));
        assert_eq!(scan_backward(&buf, 6, 6), None);
    }

    #[test]
    fn marked_value_allows_zero() {
        let mut buf = vec![0u8; 48];
        buf[10..12].copy_from_slice(&[0x13, 0x00]);
        assert_eq!(find_marked(&buf, 4, 16, &[0x13, 0x00]), Some((12, 0.0)));

        buf[12..20].copy_from_slice(&f64_bytes(-42.5));
        assert_eq!(find_marked(&buf, 4, 16, &[0x13, 0x00]), Some((12, -42.5)));
        // Marker outside the window
        assert_eq!(find_marked(&buf, 11, 16, &[0x13, 0x00]), None);

        buf[12..20].copy_from_slice(&f64_bytes(f64::NAN));
        assert_eq!(find_marked(&buf, 4, 16, &[0x13, 0x00]), None);
    }

    #[test]
    fn repeated_value_allows_zero() {
        let mut buf = vec![0u8; 32];
        assert_eq!(repeated_at(&buf, 0), Some(0.0));

        buf[0..8].copy_from_slice(&f64_bytes(3.5));
        assert_eq!(repeated_at(&buf, 0), None);
        buf[8..16].copy_from_slice(&f64_bytes(3.5));
        assert_eq!(repeated_at(&buf, 0), Some(3.5));
        assert_eq!(repeated_at(&buf, 28), None);
    }
}
