//! Content identifier construction.

pub mod hash;
pub mod varint;

pub use hash::HashAlgorithm;

use crate::error::ConfigError;
use std::sync::RwLock;

/// CID version byte; this crate only ever emits v1 CIDs.
pub const CID_VERSION: u8 = 0x01;

/// Block serialization codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Raw leaf bytes, no framing.
    Raw,
    /// Protobuf-framed link node (and optionally protobuf-framed leaf).
    PbLink,
}

impl Codec {
    pub const fn id(&self) -> u8 {
        match self {
            Codec::Raw => 0x55,
            Codec::PbLink => 0x70,
        }
    }
}

/// Precomputed framing for a single codec id: the constant prefixes needed
/// to build an identity-inlined CID, a hashed CID, or (when hashing is
/// disabled) a dummy CID of the right shape.
#[derive(Debug, Clone)]
pub struct CodecMeta {
    pub identity_cid_prefix: Vec<u8>,
    pub hashed_cid_prefix: Vec<u8>,
    pub hashed_cid_length: usize,
    pub dummy_cid: Vec<u8>,
}

impl CodecMeta {
    fn build(codec_id: u8, multihash_id: u64, cid_hash_size: usize) -> Result<Self, ConfigError> {
        let mut identity_cid_prefix = Vec::with_capacity(4);
        identity_cid_prefix.push(CID_VERSION);
        varint::append_varint(&mut identity_cid_prefix, codec_id as u64)?;
        identity_cid_prefix.push(0x00);

        let mut hashed_cid_prefix = Vec::with_capacity(6);
        hashed_cid_prefix.push(CID_VERSION);
        varint::append_varint(&mut hashed_cid_prefix, codec_id as u64)?;
        varint::append_varint(&mut hashed_cid_prefix, multihash_id)?;
        varint::append_varint(&mut hashed_cid_prefix, cid_hash_size as u64)?;

        let hashed_cid_length = hashed_cid_prefix.len() + cid_hash_size;

        // The dummy CID reuses the [version, codec] prefix of the identity
        // form, then encodes a real multihash-id/length header so a
        // none-hashed run still yields CIDs whose *shape* (length) matches
        // what a real run would produce, for accurate DAG-size estimation.
        let mut dummy_cid = identity_cid_prefix[..3].to_vec();
        varint::append_varint(&mut dummy_cid, cid_hash_size as u64)?;
        dummy_cid.resize(hashed_cid_length, 0);

        Ok(Self {
            identity_cid_prefix,
            hashed_cid_prefix,
            hashed_cid_length,
            dummy_cid,
        })
    }
}

/// Memoized per-codec framing, built lazily on first use the way the
/// reference implementation's `[128]codecMeta` array is filled in.
///
/// Only codec ids `<= 127` are supported in this core: the table
/// is a compact array, not a map, and rejects larger ids at construction.
#[derive(Debug)]
pub struct CodecTable {
    slots: RwLock<Vec<Option<CodecMeta>>>,
    multihash_id: u64,
    cid_hash_size: usize,
}

impl CodecTable {
    pub fn new(multihash_id: u64, cid_hash_size: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; 128]),
            multihash_id,
            cid_hash_size,
        }
    }

    /// Returns the framing metadata for `codec`, computing and caching it on
    /// first use.
    pub fn meta(&self, codec: Codec) -> Result<CodecMeta, ConfigError> {
        let id = codec.id();
        crate::sanity_check!(id <= 127, "codec ids larger than 127 are not supported");

        if let Some(existing) = self.slots.read().unwrap()[id as usize].clone() {
            return Ok(existing);
        }

        let computed = CodecMeta::build(id, self.multihash_id, self.cid_hash_size)?;
        self.slots.write().unwrap()[id as usize] = Some(computed.clone());
        Ok(computed)
    }
}

/// Builds an identity-inlined CID: `[0x01, codec, 0x00, varint(size), content]`.
pub fn build_identity_cid(codec: Codec, content: &[u8]) -> Result<Vec<u8>, ConfigError> {
    let mut cid = Vec::with_capacity(4 + content.len());
    cid.push(CID_VERSION);
    varint::append_varint(&mut cid, codec.id() as u64)?;
    cid.push(0x00);
    varint::append_varint(&mut cid, content.len() as u64)?;
    cid.extend_from_slice(content);
    Ok(cid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_cid_shape() {
        let cid = build_identity_cid(Codec::Raw, b"A").unwrap();
        assert_eq!(cid, vec![0x01, 0x55, 0x00, 0x01, b'A']);
    }

    #[test]
    fn hashed_prefix_and_dummy_same_length() {
        let table = CodecTable::new(0x12, 32);
        let meta = table.meta(Codec::Raw).unwrap();
        assert_eq!(meta.hashed_cid_length, meta.dummy_cid.len());
        assert_eq!(meta.hashed_cid_prefix[0], CID_VERSION);
    }

    #[test]
    fn table_memoizes_metadata() {
        let table = CodecTable::new(0x12, 32);
        let a = table.meta(Codec::Raw).unwrap();
        let b = table.meta(Codec::Raw).unwrap();
        assert_eq!(a.hashed_cid_prefix, b.hashed_cid_prefix);
    }
}
