//! Forms a DAG where every link node has a fixed outdegree (child count).
//! The last node in each layer may have a lower outdegree. Must be last in
//! the collector chain.

use super::{Collector, NodeOrigin};
use crate::block::{DataSource, Header};
use crate::encoder::NodeEncoder;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct FixedOutdegreeConfig {
    pub max_outdegree: usize,
}

impl FixedOutdegreeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_outdegree == 0 {
            Err(ConfigError::single("fixed-outdegree max_outdegree must be nonzero"))
        } else {
            Ok(())
        }
    }
}

struct Layer {
    nodes: Vec<Arc<Header>>,
}

pub struct FixedOutdegreeCollector {
    cfg: FixedOutdegreeConfig,
    encoder: Arc<dyn NodeEncoder>,
    chain_position: i32,
    stack: Vec<Layer>,
}

impl FixedOutdegreeCollector {
    pub fn new(
        cfg: FixedOutdegreeConfig,
        encoder: Arc<dyn NodeEncoder>,
        chain_position: i32,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg, encoder, chain_position, stack: vec![Layer { nodes: Vec::new() }] })
    }

    async fn compact_layers(&mut self, full_merge: bool) {
        let mut idx = 0;
        while idx < self.stack.len() {
            let cur_len = self.stack[idx].nodes.len();
            let stop = (cur_len == 1 && idx + 1 == self.stack.len())
                || (!full_merge && cur_len < self.cfg.max_outdegree);
            if stop {
                break;
            }

            if idx + 1 == self.stack.len() {
                self.stack.push(Layer { nodes: Vec::new() });
            }

            let mut last_cut = 0;
            loop {
                let cur_len = self.stack[idx].nodes.len();
                let remaining = cur_len - last_cut;
                if remaining < self.cfg.max_outdegree && !(full_merge && last_cut < cur_len) {
                    break;
                }
                let take = remaining.min(self.cfg.max_outdegree);
                let children = self.stack[idx].nodes[last_cut..last_cut + take].to_vec();
                let origin = NodeOrigin::collector(self.chain_position, idx as i32);
                let link = self.encoder.new_link(origin, &children).await;
                self.stack[idx + 1].nodes.push(link);
                last_cut += take;
            }

            let remaining = self.stack[idx].nodes.split_off(last_cut);
            self.stack[idx].nodes = remaining;
            idx += 1;
        }
    }
}

#[async_trait]
impl Collector for FixedOutdegreeCollector {
    async fn append_data(&mut self, ds: DataSource) -> Vec<Arc<Header>> {
        let hdr = self.encoder.new_leaf(ds, NodeOrigin::LEAF_DATA).await;
        self.append_block(hdr).await
    }

    async fn append_block(&mut self, hdr: Arc<Header>) -> Vec<Arc<Header>> {
        self.stack[0].nodes.push(hdr);
        if self.stack[0].nodes.len() >= self.cfg.max_outdegree {
            self.compact_layers(false).await;
        }
        Vec::new()
    }

    async fn flush_state(&mut self) -> (Vec<Arc<Header>>, Option<Arc<Header>>) {
        if self.stack.last().map(|l| l.nodes.is_empty()).unwrap_or(true) && self.stack.len() == 1 {
            return (Vec::new(), None);
        }
        self.compact_layers(true).await;
        let root = self.stack.last().and_then(|l| l.nodes.first().cloned());
        self.stack = vec![Layer { nodes: Vec::new() }];
        (Vec::new(), root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Encoder, EncoderConfig};
    use crate::cid::HashAlgorithm;
    use bytes::Bytes;
    use crate::rope::ByteRope;

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
            content: ByteRope::from(Bytes::from(vec![byte; 8])),
            size: 8,
            meta: Default::default(),
        }
    }

    #[tokio::test]
    async fn outdegree_exactly_n_except_last_layer_remainder() {
        let mut co = FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 4 }, encoder(), 1).unwrap();
        for i in 0..10u8 {
            co.append_data(ds(i)).await;
        }
        let (_, root) = co.flush_state().await;
        assert!(root.is_some());
    }

    #[tokio::test]
    async fn single_leaf_is_its_own_root() {
        let mut co = FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 4 }, encoder(), 1).unwrap();
        let hdr = co.append_data(ds(1)).await;
        assert!(hdr.is_empty());
        let (_, root) = co.flush_state().await;
        assert!(root.is_some());
    }

    #[tokio::test]
    async fn empty_input_has_no_root() {
        let mut co = FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 4 }, encoder(), 1).unwrap();
        let (_, root) = co.flush_state().await;
        assert!(root.is_none());
    }

    #[tokio::test]
    async fn rejects_zero_outdegree() {
        assert!(FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 0 }, encoder(), 1).is_err());
    }
}
