//! Discard collector: encodes each leaf (so its CID/hash cost is still
//! paid, for chunk-only throughput benchmarking) but aggregates nothing and
//! never produces a root. Must be last in the collector chain.

use super::{Collector, NodeOrigin};
use crate::block::{DataSource, Header};
use crate::encoder::NodeEncoder;
use async_trait::async_trait;
use std::sync::Arc;

pub struct NoopCollector {
    encoder: Arc<dyn NodeEncoder>,
}

impl NoopCollector {
    pub fn new(encoder: Arc<dyn NodeEncoder>) -> Self {
        Self { encoder }
    }
}

#[async_trait]
impl Collector for NoopCollector {
    async fn append_data(&mut self, ds: DataSource) -> Vec<Arc<Header>> {
        self.encoder.new_leaf(ds, NodeOrigin::LEAF_DATA).await;
        Vec::new()
    }

    async fn append_block(&mut self, _hdr: Arc<Header>) -> Vec<Arc<Header>> {
        Vec::new()
    }

    async fn flush_state(&mut self) -> (Vec<Arc<Header>>, Option<Arc<Header>>) {
        (Vec::new(), None)
    }
}
