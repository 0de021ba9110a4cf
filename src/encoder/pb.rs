//! Minimal protobuf wire-format framing for PB-link nodes and length-prefixed
//! leaves (codec `0x70`). Not a general protobuf codec: only the handful of
//! field shapes DAG-PB / UnixFS-style leaves need, following the same
//! "just enough wire format" approach as `src/cbor.rs`.

use crate::block::Header;
use crate::cid::varint;
use crate::rope::ByteRope;
use std::sync::Arc;

const WIRE_VARINT: u8 = 0;
const WIRE_LEN_DELIM: u8 = 2;

fn append_tag(out: &mut Vec<u8>, field: u64, wire_type: u8) {
    let tag = (field << 3) | wire_type as u64;
    varint::append_varint(out, tag).expect("field tags are always small");
}

fn append_varint_field(out: &mut Vec<u8>, field: u64, value: u64) {
    append_tag(out, field, WIRE_VARINT);
    varint::append_varint(out, value).expect("varint field values fit the 9-byte cap");
}

fn append_bytes_field(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    append_tag(out, field, WIRE_LEN_DELIM);
    varint::append_varint(out, bytes.len() as u64).expect("field length fits the 9-byte cap");
    out.extend_from_slice(bytes);
}

/// Wraps raw leaf bytes as `{ Data: bytes = 1, Filesize: varint = 2 }`, the
/// length-prefixed leaf encoding selected when `protobuf_leaves` is set.
pub fn frame_leaf(content: &ByteRope) -> ByteRope {
    let raw = content.append_to(Vec::with_capacity(content.size()));
    let mut framed = Vec::with_capacity(raw.len() + 16);
    append_bytes_field(&mut framed, 1, &raw);
    append_varint_field(&mut framed, 2, raw.len() as u64);
    ByteRope::from(framed)
}

/// Frames a link node as `{ Links: repeated PBLink = 2 }`, each
/// `PBLink = { Hash: bytes = 1, Tsize: varint = 3 }` (Name is always empty
/// and omitted, matching the default "every link is anonymous" behavior).
/// `_legacy_cidv0` is unused here: stripping CID multibase/version framing
/// is not needed in this path, since CIDv0 links are already just the raw
/// multihash, produced upstream by the CIDv0-compatible encoder
/// configuration; the parameter is kept only so callers can pass the flag
/// through without a branch at the call site.
pub fn frame_link(
    child_cids: &[Vec<u8>],
    children: &[Arc<Header>],
    tsize_links: bool,
    _legacy_cidv0: bool,
) -> ByteRope {
    let mut out = Vec::new();
    for (cid, child) in child_cids.iter().zip(children.iter()) {
        let mut link = Vec::with_capacity(cid.len() + 16);
        append_bytes_field(&mut link, 1, cid);
        if tsize_links {
            append_varint_field(&mut link, 3, child.size_cumulative_dag());
        }
        append_bytes_field(&mut out, 2, &link);
    }
    ByteRope::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn leaf_framing_embeds_raw_bytes_and_length() {
        let content = ByteRope::from(Bytes::from_static(b"payload"));
        let framed = frame_leaf(&content);
        let bytes = framed.append_to(Vec::new());
        // field 1 tag (1<<3|2)=0x0A, length 7, the payload, field 2 tag
        // (2<<3|0)=0x10, then varint(7)
        assert_eq!(bytes[0], 0x0A);
        assert_eq!(bytes[1], 7);
        assert_eq!(&bytes[2..9], b"payload");
        assert_eq!(bytes[9], 0x10);
        assert_eq!(bytes[10], 7);
    }
}
