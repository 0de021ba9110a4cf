//! The canonical CARv1 "null-root" header.
//!
//! Reproduced byte-for-byte from the reference implementation; external CAR
//! sinks that want to stream a CARv1 file before the final root CID is known
//! can write this placeholder header up front and patch the root in later.

/// `varint(25) || {"roots": [<nul-identity-cid>], "version": 1}` DAG-CBOR.
///
/// Layout: a 1-byte varint length, a 2-key CBOR map, a 1-element array
/// holding a CBOR tag-42 link to the nul-identity CID
/// `0x00 0x01 0x55 0x00 0x00`, and `version: 1`.
pub const NUL_ROOT_CAR_HEADER: &[u8] = &[
    0x19, // 25 bytes of CBOR follow (encoded as a varint)
    0xA2, // map, 2 keys
    0x65, b'r', b'o', b'o', b't', b's', // "roots"
    0x81, // array, 1 element
    0xD8, 0x2A, // tag 42 (CID link)
    0x45, // bytes, length 5
    0x00, 0x01, 0x55, 0x00, 0x00, // nul-identity CID
    0x67, b'v', b'e', b'r', b's', b'i', b'o', b'n', // "version"
    0x01, // 1
];
