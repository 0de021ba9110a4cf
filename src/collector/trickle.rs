//! Side-balanced "trickle" layout: optimized for streaming large inputs
//! where later data should sit deeper and further right from the root, so
//! an incremental reader can start consuming the DAG before ingestion
//! finishes. Must be last in the collector chain.

use super::{Collector, NodeOrigin};
use crate::block::{DataSource, Header};
use crate::encoder::NodeEncoder;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct TrickleConfig {
    pub max_direct_leaves: usize,
    pub max_sibling_subgroups: usize,
}

impl TrickleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();
        if self.max_direct_leaves == 0 {
            errs.push("trickle max_direct_leaves must be nonzero".to_string());
        }
        if self.max_sibling_subgroups == 0 {
            errs.push("trickle max_sibling_subgroups must be nonzero".to_string());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(errs))
        }
    }
}

/// One descent level's in-progress builder: direct leaves accumulated at
/// this depth, plus completed subgroups (each a link node already handed to
/// the next depth up) waiting to be folded into this level's own link node
/// once `max_sibling_subgroups` of them have accumulated.
struct Level {
    direct: Vec<Arc<Header>>,
    subgroups: Vec<Arc<Header>>,
}

impl Level {
    fn new() -> Self {
        Self { direct: Vec::new(), subgroups: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.subgroups.is_empty()
    }
}

pub struct TrickleCollector {
    cfg: TrickleConfig,
    encoder: Arc<dyn NodeEncoder>,
    chain_position: i32,
    levels: Vec<Level>,
    /// Count of direct-leaf groups placed at level 0 so far, used to derive
    /// each new group's descent level.
    group_count: u64,
}

impl TrickleCollector {
    pub fn new(
        cfg: TrickleConfig,
        encoder: Arc<dyn NodeEncoder>,
        chain_position: i32,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg, encoder, chain_position, levels: vec![Level::new()], group_count: 0 })
    }

    /// Emits a link node from everything accumulated at `depth` (direct
    /// leaves followed by already-built subgroups, in append order) and
    /// folds it one level up, growing `levels` if needed.
    async fn collapse_level(&mut self, depth: usize) {
        if depth + 1 >= self.levels.len() {
            self.levels.push(Level::new());
        }
        let level = &mut self.levels[depth];
        if level.is_empty() {
            return;
        }
        let mut children = std::mem::take(&mut level.direct);
        children.extend(std::mem::take(&mut level.subgroups));
        let origin = NodeOrigin::collector(self.chain_position, depth as i32);
        let link = self.encoder.new_link(origin, &children).await;
        self.levels[depth + 1].subgroups.push(link);
    }

    /// Folds every non-empty level bottom-up into a single final node.
    async fn cascade_all(&mut self) -> Option<Arc<Header>> {
        for depth in 0..self.levels.len() {
            if !self.levels[depth].is_empty() {
                self.collapse_level(depth).await;
            }
        }
        let mut root = None;
        for depth in (0..self.levels.len()).rev() {
            if let Some(last) = self.levels[depth].subgroups.pop() {
                root = Some(last);
                break;
            }
        }
        root
    }
}

#[async_trait]
impl Collector for TrickleCollector {
    async fn append_data(&mut self, ds: DataSource) -> Vec<Arc<Header>> {
        let hdr = self.encoder.new_leaf(ds, NodeOrigin::LEAF_DATA).await;
        self.append_block(hdr).await
    }

    async fn append_block(&mut self, hdr: Arc<Header>) -> Vec<Arc<Header>> {
        self.levels[0].direct.push(hdr);
        self.group_count += 1;

        if self.levels[0].direct.len() >= self.cfg.max_direct_leaves {
            self.collapse_level(0).await;

            // fold completed subgroups upward as soon as a level accrues
            // `max_sibling_subgroups` of them, so deeper data lands further
            // right and deeper (side-balanced descent-level placement).
            let mut depth = 1;
            while depth < self.levels.len()
                && self.levels[depth].subgroups.len() >= self.cfg.max_sibling_subgroups
            {
                self.collapse_level(depth).await;
                depth += 1;
            }
        }
        Vec::new()
    }

    async fn flush_state(&mut self) -> (Vec<Arc<Header>>, Option<Arc<Header>>) {
        if self.levels.iter().all(Level::is_empty) {
            return (Vec::new(), None);
        }
        let root = self.cascade_all().await;
        self.levels = vec![Level::new()];
        self.group_count = 0;
        (Vec::new(), root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::HashAlgorithm;
    use crate::encoder::{Encoder, EncoderConfig};
    use crate::rope::ByteRope;
    use bytes::Bytes;

    fn encoder() -> Arc<dyn NodeEncoder> {
        Arc::new(
            Encoder::new(
                EncoderConfig {
                    protobuf_leaves: false,
                    hash_algorithm: HashAlgorithm::Sha2_256,
                    cid_hash_size: 32,
                    inline_max_size: 0,
                    legacy_cidv0_links: false,
                    tsize_links: true,
                },
                None,
            )
            .unwrap(),
        )
    }

    fn ds(byte: u8) -> DataSource {
        DataSource {
            content: ByteRope::from(Bytes::from(vec![byte; 16])),
            size: 16,
            meta: Default::default(),
        }
    }

    #[tokio::test]
    async fn empty_input_has_no_root() {
        let mut co = TrickleCollector::new(
            TrickleConfig { max_direct_leaves: 4, max_sibling_subgroups: 2 },
            encoder(),
            1,
        )
        .unwrap();
        let (_, root) = co.flush_state().await;
        assert!(root.is_none());
    }

    #[tokio::test]
    async fn single_leaf_is_its_own_root() {
        let mut co = TrickleCollector::new(
            TrickleConfig { max_direct_leaves: 4, max_sibling_subgroups: 2 },
            encoder(),
            1,
        )
        .unwrap();
        co.append_data(ds(1)).await;
        let (_, root) = co.flush_state().await;
        assert!(root.is_some());
    }

    #[tokio::test]
    async fn many_leaves_fold_into_deeper_levels() {
        let mut co = TrickleCollector::new(
            TrickleConfig { max_direct_leaves: 4, max_sibling_subgroups: 2 },
            encoder(),
            1,
        )
        .unwrap();
        for i in 0..50u8 {
            co.append_data(ds(i)).await;
        }
        let (_, root) = co.flush_state().await;
        assert!(root.is_some());
        // re-running the exact same sequence must produce the identical CID
        // (determinism across independent builder instances).
        let mut co2 = TrickleCollector::new(
            TrickleConfig { max_direct_leaves: 4, max_sibling_subgroups: 2 },
            encoder(),
            1,
        )
        .unwrap();
        for i in 0..50u8 {
            co2.append_data(ds(i)).await;
        }
        let (_, root2) = co2.flush_state().await;
        assert_eq!(root.unwrap().cid().await, root2.unwrap().cid().await);
    }

    #[tokio::test]
    async fn rejects_zero_params() {
        assert!(TrickleCollector::new(
            TrickleConfig { max_direct_leaves: 0, max_sibling_subgroups: 2 },
            encoder(),
            1
        )
        .is_err());
        assert!(TrickleCollector::new(
            TrickleConfig { max_direct_leaves: 4, max_sibling_subgroups: 0 },
            encoder(),
            1
        )
        .is_err());
    }
}
