//! Unsigned LEB128 varint helpers.
//!
//! Little-endian base-128 with a 7-bit continuation bit, capped at 9 bytes
//! as mandated by the multiformats unsigned-varint spec's practical-maximum
//! security cap. Values above `i64::MAX` are rejected rather than silently
//! wrapped.

use crate::error::ConfigError;

/// Maximum encodable value: `2^63 - 1`.
pub const MAX_VARINT_VALUE: u64 = i64::MAX as u64;

/// Appends `v` to `target` as a varint, returning the number of bytes
/// written. Mirrors `encoding.AppendVarint` from the reference chunker: a
/// pure append, no intermediate allocation.
pub fn append_varint(target: &mut Vec<u8>, v: u64) -> Result<usize, ConfigError> {
    if v > MAX_VARINT_VALUE {
        return Err(ConfigError::single(format!(
            "value {v} exceeds the maximum varint value of {MAX_VARINT_VALUE} (2^63-1 security cap)"
        )));
    }
    let mut buf = unsigned_varint::encode::u64_buffer();
    let encoded = unsigned_varint::encode::u64(v, &mut buf);
    target.extend_from_slice(encoded);
    Ok(encoded.len())
}

/// The wire size of `v` as a varint, without allocating.
pub fn varint_wire_size(v: u64) -> usize {
    if v == 0 {
        return 1;
    }
    let bits = 64 - v.leading_zeros() as usize;
    (bits + 6) / 7
}

/// Decodes a varint from the front of `input`, returning `(value, rest)`.
pub fn decode_varint_u64(input: &[u8]) -> Result<(u64, &[u8]), ConfigError> {
    unsigned_varint::decode::u64(input)
        .map_err(|e| ConfigError::single(format!("malformed varint: {e}")))
}
