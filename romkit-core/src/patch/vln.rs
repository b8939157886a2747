//! Variable-length numbers used by the block patch format.
//!
//! Seven bits per byte, least significant group first; the final byte has its high bit
//! set. Each continuation adds `1 << shift`, which makes every value's encoding unique.

use crate::error::{RomError, RomResult};

/// Append the encoding of `value`.
pub fn encode(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let low: u8 = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(0x80 | low);
            break;
        }
        out.push(low);
        value -= 1;
    }
}

/// Encode a signed offset: magnitude shifted left, sign in the low bit.
pub fn encode_signed(value: i64, out: &mut Vec<u8>) {
    let magnitude: u64 = value.unsigned_abs();
    encode((magnitude << 1) | (value < 0) as u64, out);
}

/// Decode one number starting at `*pos`, advancing it.
///
/// # Errors
/// `TruncatedRecord` if the input ends mid-number; `MalformedPatch` if it overflows 64 bits.
pub fn decode(bytes: &[u8], pos: &mut usize) -> RomResult<u64> {
    let start: usize = *pos;
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte: u8 = *bytes
            .get(*pos)
            .ok_or_else(|| RomError::truncated("variable-length number", start))?;
        *pos += 1;
        let group: u64 = (byte & 0x7F) as u64;
        if shift > 56 && group >> (64 - shift).min(63) != 0 {
            return Err(RomError::malformed_patch(start, "variable-length number overflows 64 bits"));
        }
        value = value
            .checked_add(group << shift)
            .ok_or_else(|| RomError::malformed_patch(start, "variable-length number overflows 64 bits"))?;
        if byte & 0x80 != 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(RomError::malformed_patch(start, "variable-length number overflows 64 bits"));
        }
        value = value
            .checked_add(1u64 << shift)
            .ok_or_else(|| RomError::malformed_patch(start, "variable-length number overflows 64 bits"))?;
    }
}

/// Decode a signed offset written by [`encode_signed`].
pub fn decode_signed(bytes: &[u8], pos: &mut usize) -> RomResult<i64> {
    let raw: u64 = decode(bytes, pos)?;
    let magnitude: i64 = (raw >> 1) as i64;
    Ok(if raw & 1 != 0 { -magnitude } else { magnitude })
}
