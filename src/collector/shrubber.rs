//! First-in-chain subtree aggregator: clusters runs of repeated padding
//! atoms into compact, exponentially-reused "shrubbery" subtrees instead of
//! a flat sequence, and flushes ordinary blocks to the next collector in
//! CID-directed, size-bounded groups. Must not be last in the collector
//! chain; every emitted link is handed to the successor via `append_block`.

use super::{Collector, NodeOrigin};
use crate::block::{DataSource, Header};
use crate::encoder::NodeEncoder;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::sync::Arc;

/// Key the chunker chain attaches to padding chunks (see
/// `crate::chunker::padfinder`).
const PADDING_META_KEY: &str = "padding-cluster-atom-hex";

#[derive(Debug, Clone, Copy)]
pub struct ShrubberConfig {
    /// Byte budget for both the flat non-padding stack and a padding
    /// cluster's accumulated payload. `0` disables payload-based flushing
    /// entirely (only the CID-suffix and inlined-status boundaries apply).
    pub max_payload: usize,
    /// Base of the exponential padding-cluster decomposition.
    pub repeater_layer_nodes: usize,
    pub subgroup_cid_mask_bits: u32,
    pub subgroup_cid_target: u32,
    pub subgroup_cid_min_nodes: usize,
}

impl ShrubberConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();
        if self.repeater_layer_nodes < 1 {
            errs.push("shrubber repeater_layer_nodes must be at least 1".to_string());
        }
        if !(4..=16).contains(&self.subgroup_cid_mask_bits) {
            errs.push("shrubber subgroup_cid_mask_bits must be within [4,16]".to_string());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(errs))
        }
    }
}

struct PaddingCluster {
    atom_hex: String,
    atom_leaf: Arc<Header>,
    atom_payload: u64,
    count: u64,
}

pub struct ShrubberCollector {
    cfg: ShrubberConfig,
    encoder: Arc<dyn NodeEncoder>,
    chain_position: i32,
    cluster: Option<PaddingCluster>,
    stack: Vec<Arc<Header>>,
    stack_payload: u64,
}

impl ShrubberCollector {
    pub fn new(
        cfg: ShrubberConfig,
        encoder: Arc<dyn NodeEncoder>,
        chain_position: i32,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            encoder,
            chain_position,
            cluster: None,
            stack: Vec::new(),
            stack_payload: 0,
        })
    }

    /// Decomposes `cluster.count` copies of the atom into the smallest set
    /// of reused super-blocks (a base-`repeater_layer_nodes` positional
    /// decomposition, largest power first) and wraps them in one link node.
    /// A singleton cluster needs no wrapping: the atom leaf itself is the
    /// whole "cluster".
    async fn close_cluster(&mut self) -> Option<Arc<Header>> {
        let cluster = self.cluster.take()?;
        if cluster.count == 1 {
            return Some(cluster.atom_leaf);
        }

        let base = self.cfg.repeater_layer_nodes as u64;
        let mut powers = vec![cluster.atom_leaf.clone()];
        let mut power_values = vec![1u64];
        while power_values.last().copied().unwrap_or(1) * base <= cluster.count {
            let prev = powers.last().unwrap().clone();
            let children: Vec<Arc<Header>> = std::iter::repeat(prev).take(base as usize).collect();
            let link = self
                .encoder
                .new_link(NodeOrigin::LEAF_PADDING_SUPERBLOCK, &children)
                .await;
            powers.push(link);
            power_values.push(power_values.last().unwrap() * base);
        }

        let mut remaining = cluster.count;
        let mut children = Vec::new();
        for i in (0..powers.len()).rev() {
            let take = remaining / power_values[i];
            for _ in 0..take {
                children.push(powers[i].clone());
            }
            remaining -= take * power_values[i];
        }
        crate::sanity_check!(remaining == 0, "padding cluster decomposition left a remainder");

        Some(self.encoder.new_link(NodeOrigin::LEAF_PADDING, &children).await)
    }

    async fn flush_stack(&mut self) -> Option<Arc<Header>> {
        if self.stack.is_empty() {
            return None;
        }
        let children = std::mem::take(&mut self.stack);
        self.stack_payload = 0;
        let origin = NodeOrigin::collector(self.chain_position, 0);
        Some(self.encoder.new_link(origin, &children).await)
    }

    async fn append_padding(&mut self, atom_hex: String, ds: DataSource) -> Vec<Arc<Header>> {
        let mut forward: Vec<Arc<Header>> = self.flush_stack().await.into_iter().collect();

        let atom_payload = ds.size as u64;
        let starts_new = match &self.cluster {
            Some(c) if c.atom_hex == atom_hex => {
                self.cfg.max_payload > 0
                    && (c.count + 1) * c.atom_payload > self.cfg.max_payload as u64
            }
            _ => true,
        };

        if starts_new {
            forward.extend(self.close_cluster().await);
            let atom_leaf = self.encoder.new_leaf(ds, NodeOrigin::LEAF_PADDING).await;
            self.cluster = Some(PaddingCluster { atom_hex, atom_leaf, atom_payload, count: 1 });
        } else if let Some(c) = self.cluster.as_mut() {
            c.count += 1;
        }

        forward
    }

    async fn append_non_padding(&mut self, hdr: Arc<Header>) -> Vec<Arc<Header>> {
        let mut forward: Vec<Arc<Header>> = self.close_cluster().await.into_iter().collect();

        if let Some(last) = self.stack.last() {
            if last.is_cid_inlined() != hdr.is_cid_inlined() {
                forward.extend(self.flush_stack().await);
            }
        }

        if self.cfg.max_payload > 0
            && !self.stack.is_empty()
            && self.stack_payload + hdr.size_cumulative_payload() > self.cfg.max_payload as u64
        {
            forward.extend(self.flush_stack().await);
        }

        self.stack_payload += hdr.size_cumulative_payload();
        self.stack.push(hdr.clone());

        if self.stack.len() >= self.cfg.subgroup_cid_min_nodes {
            let cid = hdr.cid().await;
            if cid.len() >= 2 {
                let tail = u16::from_be_bytes([cid[cid.len() - 2], cid[cid.len() - 1]]) as u32;
                let mask = (1u32 << self.cfg.subgroup_cid_mask_bits) - 1;
                if (tail & mask) == self.cfg.subgroup_cid_target {
                    forward.extend(self.flush_stack().await);
                }
            }
        }

        forward
    }
}

#[async_trait]
impl Collector for ShrubberCollector {
    async fn append_data(&mut self, ds: DataSource) -> Vec<Arc<Header>> {
        if let Some(atom_hex) = ds.meta.get(PADDING_META_KEY).cloned() {
            return self.append_padding(atom_hex, ds).await;
        }
        let hdr = self.encoder.new_leaf(ds, NodeOrigin::LEAF_DATA).await;
        self.append_non_padding(hdr).await
    }

    async fn append_block(&mut self, hdr: Arc<Header>) -> Vec<Arc<Header>> {
        self.append_non_padding(hdr).await
    }

    async fn flush_state(&mut self) -> (Vec<Arc<Header>>, Option<Arc<Header>>) {
        let mut forward: Vec<Arc<Header>> = self.close_cluster().await.into_iter().collect();
        forward.extend(self.flush_stack().await);
        (forward, None)
    }
}
