//! Minimal CBOR major-type/length header encoding, used to frame link-node
//! children (and the null-root header constant). Not a general CBOR codec:
//! only the handful of constructs link nodes need.

/// Appends a CBOR major-type/length header. `length` is only meaningful for
/// major types 0-4 (uint, negative int, bytes, text, array) and 5 (map,
/// where `length` is the number of key/value pairs).
pub fn append_header(out: &mut Vec<u8>, major_type: u8, length: u64) {
    let initial_byte_type = major_type << 5;
    if length <= 23 {
        out.push(initial_byte_type | length as u8);
    } else if length <= 0xFF {
        out.push(initial_byte_type | 24);
        out.push(length as u8);
    } else if length <= 0xFFFF {
        out.push(initial_byte_type | 25);
        out.extend_from_slice(&(length as u16).to_be_bytes());
    } else if length <= 0xFFFF_FFFF {
        out.push(initial_byte_type | 26);
        out.extend_from_slice(&(length as u32).to_be_bytes());
    } else {
        out.push(initial_byte_type | 27);
        out.extend_from_slice(&length.to_be_bytes());
    }
}

pub fn append_uint(out: &mut Vec<u8>, value: u64) {
    append_header(out, 0, value);
}

pub fn append_byte_string(out: &mut Vec<u8>, bytes: &[u8]) {
    append_header(out, 2, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub fn append_text_string(out: &mut Vec<u8>, text: &str) {
    append_header(out, 3, text.len() as u64);
    out.extend_from_slice(text.as_bytes());
}

pub fn append_array_header(out: &mut Vec<u8>, count: u64) {
    append_header(out, 4, count);
}

pub fn append_map_header(out: &mut Vec<u8>, pairs: u64) {
    append_header(out, 5, pairs);
}
