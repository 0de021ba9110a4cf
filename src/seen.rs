//! The seen-blocks index and seen-roots tracker: both are mutated only by
//! the pipeline driver, immediately after each collector callback, so no
//! locking is required.

use crate::block::Header;
use crate::encoder::NodeOrigin;
use std::collections::HashMap;

/// A CID is deduplicated on the last 16 bytes of its byte form, matching the
/// reference implementation's truncated-suffix index key: short enough to
/// keep the map small, long enough that a collision within one run is
/// astronomically unlikely for any real hash algorithm.
pub type CidSuffix = [u8; 16];

fn suffix_of(cid: &[u8]) -> CidSuffix {
    let mut out = [0u8; 16];
    let take = cid.len().min(16);
    out[16 - take..].copy_from_slice(&cid[cid.len() - take..]);
    out
}

/// Per-unique-block bookkeeping: its serialized size, plus how many times
/// it was produced from each originating layer (leaf-data, leaf-padding,
/// leaf-padding-superblock, or a numbered collector stage/sub-layer).
#[derive(Debug, Clone, Default)]
pub struct SeenBlockRecord {
    pub size_block: usize,
    pub layers: HashMap<NodeOrigin, u64>,
}

/// Counts unique blocks and classifies them by originating layer.
/// Identity-inlined and dummy-hashed blocks are excluded: they either carry
/// no real digest to deduplicate on, or share one degenerate all-zero CID
/// per codec that would otherwise swamp the index.
#[derive(Debug, Default)]
pub struct SeenBlocks {
    blocks: HashMap<CidSuffix, SeenBlockRecord>,
    unique_count: u64,
}

impl SeenBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one emission of `header` at `origin`. Returns `None` when the
    /// block is excluded from the index (inlined or dummy-hashed), otherwise
    /// `Some(is_new)` indicating whether this CID suffix was seen before.
    pub fn observe(&mut self, header: &Header, cid: &[u8], origin: NodeOrigin) -> Option<bool> {
        if header.is_cid_inlined() || header.dummy_hashed() {
            return None;
        }
        let suffix = suffix_of(cid);
        let is_new = !self.blocks.contains_key(&suffix);
        let record = self.blocks.entry(suffix).or_insert_with(|| SeenBlockRecord {
            size_block: header.size_block(),
            layers: HashMap::new(),
        });
        *record.layers.entry(origin).or_insert(0) += 1;
        if is_new {
            self.unique_count += 1;
        }
        Some(is_new)
    }

    pub fn unique_count(&self) -> u64 {
        self.unique_count
    }

    pub fn records(&self) -> impl Iterator<Item = (&CidSuffix, &SeenBlockRecord)> {
        self.blocks.iter()
    }
}

/// Tracks root CIDs emitted across substreams in one process run, so a
/// repeated identical root (e.g. two empty inputs back to back) can be
/// flagged as a duplicate for the root/pin sink.
#[derive(Debug, Default)]
pub struct SeenRoots {
    roots: HashMap<CidSuffix, u64>,
}

impl SeenRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `cid` as a root, returning whether it had already been seen.
    pub fn observe(&mut self, cid: &[u8]) -> bool {
        let suffix = suffix_of(cid);
        let count = self.roots.entry(suffix).or_insert(0);
        let is_duplicate = *count > 0;
        *count += 1;
        is_duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rope::ByteRope;
    use bytes::Bytes;

    fn header(cid: Vec<u8>, inlined: bool, dummy: bool) -> Header {
        Header::with_ready_cid(ByteRope::from(Bytes::from_static(b"x")), cid, 1, 1, inlined, dummy)
    }

    #[test]
    fn counts_unique_and_repeated_blocks() {
        let mut seen = SeenBlocks::new();
        let h1 = header(vec![1; 36], false, false);
        let h2 = header(vec![1; 36], false, false); // identical CID
        let h3 = header(vec![2; 36], false, false);

        assert_eq!(seen.observe(&h1, &[1; 36], NodeOrigin::LEAF_DATA), Some(true));
        assert_eq!(seen.observe(&h2, &[1; 36], NodeOrigin::LEAF_DATA), Some(false));
        assert_eq!(seen.observe(&h3, &[2; 36], NodeOrigin::LEAF_DATA), Some(true));
        assert_eq!(seen.unique_count(), 2);
    }

    #[test]
    fn inlined_and_dummy_blocks_are_excluded() {
        let mut seen = SeenBlocks::new();
        let inlined = header(vec![1, 0x55, 0, 1, b'A'], true, false);
        let dummy = header(vec![0; 36], false, true);
        assert_eq!(seen.observe(&inlined, &[1, 0x55, 0, 1, b'A'], NodeOrigin::LEAF_DATA), None);
        assert_eq!(seen.observe(&dummy, &[0; 36], NodeOrigin::LEAF_DATA), None);
        assert_eq!(seen.unique_count(), 0);
    }

    #[test]
    fn tracks_per_layer_counts() {
        let mut seen = SeenBlocks::new();
        let h = header(vec![7; 36], false, false);
        seen.observe(&h, &[7; 36], NodeOrigin::LEAF_DATA);
        seen.observe(&h, &[7; 36], NodeOrigin::collector(1, 0));
        let (_, record) = seen.records().next().unwrap();
        assert_eq!(record.layers.len(), 2);
    }

    #[test]
    fn seen_roots_flags_repeats() {
        let mut roots = SeenRoots::new();
        assert!(!roots.observe(&[9; 36]));
        assert!(roots.observe(&[9; 36]));
        assert!(!roots.observe(&[8; 36]));
    }
}
