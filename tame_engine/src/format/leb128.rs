// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! LEB128 varints used for counts, lengths and integer payloads.

use crate::format::DecodeError;

/// Maximum encoded length of a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

/// Reads an unsigned LEB128 integer starting at `*offset`, advancing it past the varint.
pub(crate) fn read_uleb(bytes: &[u8], offset: &mut usize) -> Result<u64, DecodeError> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;
        let payload = u64::from(b & 0x7f);
        // The tenth byte may only carry the single remaining bit of a u64.
        if i == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(DecodeError::InvalidVarint);
        }
        value |= payload << (7 * i);
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DecodeError::InvalidVarint)
}

/// Reads a signed LEB128 integer starting at `*offset`, advancing it past the varint.
pub(crate) fn read_sleb(bytes: &[u8], offset: &mut usize) -> Result<i64, DecodeError> {
    let mut value: i64 = 0;
    let mut shift = 0_u32;
    for i in 0..MAX_VARINT_LEN {
        let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;
        let payload = b & 0x7f;
        if i == MAX_VARINT_LEN - 1 && payload != 0x00 && payload != 0x7f {
            return Err(DecodeError::InvalidVarint);
        }
        value |= i64::from(payload) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            if shift < 64 && b & 0x40 != 0 {
                value |= !0_i64 << shift;
            }
            return Ok(value);
        }
    }
    Err(DecodeError::InvalidVarint)
}

/// Appends `value` as an unsigned LEB128 integer.
pub(crate) fn write_uleb(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Appends `value` as a signed LEB128 integer.
pub(crate) fn write_sleb(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let b = (value & 0x7f) as u8;
        value >>= 7;
        let sign_clear = b & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            out.push(b);
            return;
        }
        out.push(b | 0x80);
    }
}
