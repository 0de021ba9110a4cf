//! The collector chain: aggregates leaves and link nodes into the final DAG.

pub mod fixed_cid_refs_size;
pub mod fixed_outdegree;
pub mod noop;
pub mod shrubber;
pub mod trickle;

use crate::block::{DataSource, Header};
use async_trait::async_trait;
use std::sync::Arc;

pub use crate::encoder::NodeOrigin;

/// `append_data`/`append_block`/`flush_state` all return the link nodes (if
/// any) that must be forwarded to the *next* collector in the chain. Only a
/// non-terminal collector (the shrubber) ever returns anything non-empty;
/// terminal collectors (fixed-outdegree, fixed-cid-refs-size, trickle, noop)
/// manage their own internal cascade and return nothing until `flush_state`
/// hands back the final root.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn append_data(&mut self, ds: DataSource) -> Vec<Arc<Header>>;
    async fn append_block(&mut self, hdr: Arc<Header>) -> Vec<Arc<Header>>;
    /// Returns `(forward, root)`: `forward` holds nodes that still need to
    /// reach the next collector, `root` is populated only by the terminal
    /// collector's own cascading merge.
    async fn flush_state(&mut self) -> (Vec<Arc<Header>>, Option<Arc<Header>>);
}

/// Drives a full collector chain: incoming leaves reach `chain[0]` via
/// `append_data`; whatever it forwards propagates through `append_block` on
/// every subsequent collector.
pub struct CollectorChain {
    stages: Vec<Box<dyn Collector>>,
}

impl CollectorChain {
    pub fn new(stages: Vec<Box<dyn Collector>>) -> Result<Self, crate::error::ConfigError> {
        if stages.is_empty() {
            return Err(crate::error::ConfigError::single(
                "collector chain must contain at least one collector",
            ));
        }
        Ok(Self { stages })
    }

    pub async fn ingest(&mut self, ds: DataSource) {
        let mut forward = self.stages[0].append_data(ds).await;
        for stage in self.stages.iter_mut().skip(1) {
            let mut next = Vec::new();
            for hdr in forward.drain(..) {
                next.extend(stage.append_block(hdr).await);
            }
            forward = next;
        }
    }

    /// Flushes head to tail, returning the last collector's emitted root.
    pub async fn flush(&mut self) -> Option<Arc<Header>> {
        let mut pending: Vec<Arc<Header>> = Vec::new();
        let mut root = None;
        for i in 0..self.stages.len() {
            let (forward, maybe_root) = self.stages[i].flush_state().await;
            pending.extend(forward);
            if let Some(r) = maybe_root {
                root = Some(r);
            }
            if i + 1 < self.stages.len() {
                let mut next_pending = Vec::new();
                for hdr in pending.drain(..) {
                    next_pending.extend(self.stages[i + 1].append_block(hdr).await);
                }
                pending = next_pending;
            }
        }
        root
    }
}
