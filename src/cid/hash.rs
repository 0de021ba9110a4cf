//! Hash algorithm table.
//!
//! Multihash ids come from the multiformats multicodec table. `None` is a
//! pseudo-algorithm: it never touches the bytes and yields a zero digest of
//! the codec-appropriate length, for runs where hashing is intentionally
//! skipped but callers still need CIDs of the right shape ("dummy_hashed").

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as _};
use sha2::Sha256;
use sha3::Sha3_512;

use crate::rope::ByteRope;

type Blake2b256Impl = Blake2b<U32>;

/// A selectable digest algorithm for CID construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// Emits no real digest; used for chunk-shape-only dry runs.
    None,
    Sha2_256,
    Sha3_512,
    Blake2b256,
    /// Non-cryptographic, fast. Excluded from CAR/export sinks (`no_export`).
    Murmur3_128,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "none" => HashAlgorithm::None,
            "sha2-256" => HashAlgorithm::Sha2_256,
            "sha3-512" => HashAlgorithm::Sha3_512,
            "blake2b-256" => HashAlgorithm::Blake2b256,
            "murmur3-128" => HashAlgorithm::Murmur3_128,
            _ => return None,
        })
    }

    /// Multihash algorithm id, varint-encoded into the CID. `None` has no
    /// multihash id since it never produces a real multihash.
    pub fn multihash_id(&self) -> Option<u64> {
        match self {
            HashAlgorithm::None => None,
            HashAlgorithm::Sha2_256 => Some(0x12),
            HashAlgorithm::Sha3_512 => Some(0x14),
            HashAlgorithm::Blake2b256 => Some(0xb220),
            HashAlgorithm::Murmur3_128 => Some(0x22),
        }
    }

    /// Size in bytes of the algorithm's native digest. `None` is treated as
    /// unbounded (it is never asked to satisfy a --hash-bits request).
    pub fn native_digest_len(&self) -> Option<usize> {
        match self {
            HashAlgorithm::None => None,
            HashAlgorithm::Sha2_256 => Some(32),
            HashAlgorithm::Sha3_512 => Some(64),
            HashAlgorithm::Blake2b256 => Some(32),
            HashAlgorithm::Murmur3_128 => Some(16),
        }
    }

    /// True for algorithms that must never appear in blocks handed to an
    /// export sink (CAR writer, pin sink).
    pub fn no_export(&self) -> bool {
        matches!(self, HashAlgorithm::Murmur3_128)
    }

    /// Computes the full native digest over `content`, then truncates to
    /// `out_len` bytes. Panics (a sanity violation) if `out_len` exceeds the
    /// native digest length; callers validate this at configuration time.
    pub fn digest(&self, content: &ByteRope, out_len: usize) -> Vec<u8> {
        let full = match self {
            HashAlgorithm::None => {
                crate::sanity_check!(false, "digest() called on the 'none' hash algorithm");
                Vec::new()
            }
            HashAlgorithm::Sha2_256 => {
                let mut h = Sha256::new();
                for seg in content.segments() {
                    h.update(seg);
                }
                h.finalize().to_vec()
            }
            HashAlgorithm::Sha3_512 => {
                let mut h = Sha3_512::new();
                for seg in content.segments() {
                    h.update(seg);
                }
                h.finalize().to_vec()
            }
            HashAlgorithm::Blake2b256 => {
                let mut h = Blake2b256Impl::new();
                for seg in content.segments() {
                    h.update(seg);
                }
                h.finalize().to_vec()
            }
            HashAlgorithm::Murmur3_128 => {
                let contiguous = content.append_to(Vec::with_capacity(content.size()));
                let mut cursor = std::io::Cursor::new(contiguous);
                let hash = murmur3::murmur3_x64_128(&mut cursor, 0)
                    .expect("murmur3 over an in-memory buffer cannot fail");
                hash.to_be_bytes().to_vec()
            }
        };
        crate::sanity_check!(
            out_len <= full.len(),
            "requested digest length exceeds native digest size"
        );
        full[..out_len].to_vec()
    }
}
