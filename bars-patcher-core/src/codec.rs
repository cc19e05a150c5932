//! Fixed-offset field extraction from raw header buffers.
//!
//! None of these helpers bounds-check beyond what slice indexing already
//! does: callers validate buffer lengths once up front and then read fields
//! at known offsets.

use serde::{Deserialize, Serialize};

/// Byte order of a BWAV file, detected from its BOM sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Little,
    Big,
}

/// Borrow `len` bytes starting at `start`.
pub fn slice(buf: &[u8], start: usize, len: usize) -> &[u8] {
    &buf[start..start + len]
}

/// Decode an unsigned integer of up to 4 bytes. Longer lengths are clamped
/// to 4.
pub fn number(buf: &[u8], start: usize, len: usize, endian: Endian) -> u32 {
    let bytes = slice(buf, start, len.min(4));
    match endian {
        Endian::Little => bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
        Endian::Big => bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
    }
}

/// Decode a sign-extended 16-bit sample. Only used for BOM detection, where
/// the bytes `FE FF` read big-endian give -257.
pub fn int16_sample(buf: &[u8], start: usize, endian: Endian) -> i32 {
    let pair = [buf[start], buf[start + 1]];
    let value = match endian {
        Endian::Little => i16::from_le_bytes(pair),
        Endian::Big => i16::from_be_bytes(pair),
    };
    i32::from(value)
}

/// Decode a fixed-width ASCII field. NUL bytes inside the field become
/// spaces so a short magic never compares equal to a longer one.
pub fn string(buf: &[u8], start: usize, len: usize) -> String {
    slice(buf, start, len)
        .iter()
        .map(|&b| if b == 0 { ' ' } else { char::from(b) })
        .collect()
}

/// Value of the BOM sentinel at 0x04 when the file is big-endian.
const BOM_BIG_ENDIAN_SAMPLE: i32 = -257;

/// Detect a file's byte order from the BOM at `start`.
pub fn detect_endian(buf: &[u8], start: usize) -> Endian {
    if int16_sample(buf, start, Endian::Big) == BOM_BIG_ENDIAN_SAMPLE {
        Endian::Big
    } else {
        Endian::Little
    }
}
