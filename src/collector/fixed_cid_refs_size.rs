//! Forms a DAG where every link node's serialized CID-reference block stays
//! under a configured byte budget, rather than a fixed child count. Must be
//! last in the collector chain.

use super::{Collector, NodeOrigin};
use crate::block::{DataSource, Header};
use crate::encoder::NodeEncoder;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::sync::Arc;

/// A CIDv1 with a 32-byte digest is at minimum ~38 bytes once framed as a
/// protobuf link reference; 160 is the smallest budget that can ever hold
/// even one such reference plus its length-delimited framing overhead.
const MIN_CID_REFS_SIZE: usize = 160;

#[derive(Debug, Clone, Copy)]
pub struct FixedCidRefsSizeConfig {
    pub max_cid_refs_size: usize,
}

impl FixedCidRefsSizeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cid_refs_size < MIN_CID_REFS_SIZE {
            Err(ConfigError::single(format!(
                "fixed-cid-refs-size max_cid_refs_size must be at least {MIN_CID_REFS_SIZE} bytes"
            )))
        } else {
            Ok(())
        }
    }
}

struct Layer {
    nodes: Vec<Arc<Header>>,
    cid_refs_size: usize,
}

impl Layer {
    fn new() -> Self {
        Self { nodes: Vec::new(), cid_refs_size: 0 }
    }
}

pub struct FixedCidRefsSizeCollector {
    cfg: FixedCidRefsSizeConfig,
    encoder: Arc<dyn NodeEncoder>,
    chain_position: i32,
    stack: Vec<Layer>,
}

impl FixedCidRefsSizeCollector {
    pub fn new(
        cfg: FixedCidRefsSizeConfig,
        encoder: Arc<dyn NodeEncoder>,
        chain_position: i32,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg, encoder, chain_position, stack: vec![Layer::new()] })
    }

    async fn push(&mut self, layer_idx: usize, hdr: Arc<Header>) {
        let ref_size = hdr.cid().await.len();
        self.stack[layer_idx].cid_refs_size += ref_size;
        self.stack[layer_idx].nodes.push(hdr);
    }

    async fn compact_layers(&mut self, full_merge: bool) {
        let mut idx = 0;
        while idx < self.stack.len() {
            let stop = (self.stack[idx].nodes.len() == 1 && idx + 1 == self.stack.len())
                || (!full_merge && self.stack[idx].cid_refs_size < self.cfg.max_cid_refs_size);
            if stop {
                break;
            }

            if idx + 1 == self.stack.len() {
                self.stack.push(Layer::new());
            }

            let mut last_cut = 0;
            loop {
                let nodes = &self.stack[idx].nodes;
                if last_cut >= nodes.len() {
                    break;
                }
                let mut acc = 0usize;
                let mut take = 0usize;
                for hdr in &nodes[last_cut..] {
                    let sz = hdr.cid().await.len();
                    if take > 0 && acc + sz > self.cfg.max_cid_refs_size {
                        break;
                    }
                    acc += sz;
                    take += 1;
                }
                let remaining = nodes.len() - last_cut;
                if take < remaining && !full_merge {
                    // remainder too small to justify a group yet: only keep
                    // grouping if we've accumulated a full budget's worth.
                    if acc < self.cfg.max_cid_refs_size {
                        break;
                    }
                }
                let children = self.stack[idx].nodes[last_cut..last_cut + take].to_vec();
                let origin = NodeOrigin::collector(self.chain_position, idx as i32);
                let link = self.encoder.new_link(origin, &children).await;
                let ref_size = link.cid().await.len();
                self.stack[idx + 1].nodes.push(link);
                self.stack[idx + 1].cid_refs_size += ref_size;
                last_cut += take;
                if last_cut >= self.stack[idx].nodes.len() {
                    break;
                }
            }

            let remaining_nodes = self.stack[idx].nodes.split_off(last_cut);
            let mut remaining_size = 0usize;
            for hdr in &remaining_nodes {
                remaining_size += hdr.cid().await.len();
            }
            self.stack[idx].nodes = remaining_nodes;
            self.stack[idx].cid_refs_size = remaining_size;
            idx += 1;
        }
    }
}

#[async_trait]
impl Collector for FixedCidRefsSizeCollector {
    async fn append_data(&mut self, ds: DataSource) -> Vec<Arc<Header>> {
        let hdr = self.encoder.new_leaf(ds, NodeOrigin::LEAF_DATA).await;
        self.append_block(hdr).await
    }

    async fn append_block(&mut self, hdr: Arc<Header>) -> Vec<Arc<Header>> {
        self.push(0, hdr).await;
        if self.stack[0].cid_refs_size >= self.cfg.max_cid_refs_size {
            self.compact_layers(false).await;
        }
        Vec::new()
    }

    async fn flush_state(&mut self) -> (Vec<Arc<Header>>, Option<Arc<Header>>) {
        if self.stack.len() == 1 && self.stack[0].nodes.is_empty() {
            return (Vec::new(), None);
        }
        self.compact_layers(true).await;
        let root = self.stack.last().and_then(|l| l.nodes.first().cloned());
        self.stack = vec![Layer::new()];
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
            content: ByteRope::from(Bytes::from(vec![byte; 1024])),
            size: 1024,
            meta: Default::default(),
        }
    }

    #[tokio::test]
    async fn rejects_too_small_budget() {
        assert!(FixedCidRefsSizeCollector::new(
            FixedCidRefsSizeConfig { max_cid_refs_size: 10 },
            encoder(),
            1
        )
        .is_err());
    }

    #[tokio::test]
    async fn many_leaves_cascade_into_single_root() {
        let mut co = FixedCidRefsSizeCollector::new(
            FixedCidRefsSizeConfig { max_cid_refs_size: 200 },
            encoder(),
            1,
        )
        .unwrap();
        for i in 0..40u8 {
            co.append_data(ds(i)).await;
        }
        let (_, root) = co.flush_state().await;
        assert!(root.is_some());
    }

    #[tokio::test]
    async fn empty_has_no_root() {
        let mut co = FixedCidRefsSizeCollector::new(
            FixedCidRefsSizeConfig { max_cid_refs_size: 200 },
            encoder(),
            1,
        )
        .unwrap();
        let (_, root) = co.flush_state().await;
        assert!(root.is_none());
    }
}
