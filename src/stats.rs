//! Statistics aggregation: builds the structured summary handed to the
//! statistics sink, with per-layer size percentiles and the top-level root
//! ledger.

use crate::encoder::NodeOrigin;
use crate::qrb::QrbStats;
use crate::seen::SeenBlocks;
use serde::Serialize;
use std::time::Duration;

/// Fixed percentile points the reference implementation samples size
/// distributions at.
pub const PERCENTILE_POINTS: [f64; 5] = [0.03, 0.10, 0.25, 0.50, 0.95];

/// Per-layer unique-node count and size distribution, sampled over one
/// sample per *unique* block (not weighted by how many times a duplicate
/// was re-emitted from that layer) so the percentiles describe the shape of
/// the DAG's distinct content, not its redundancy.
#[derive(Debug, Clone, Serialize)]
pub struct LayerStats {
    pub originating_layer: i32,
    pub local_sub_layer: i32,
    pub unique_node_count: u64,
    /// Sizes at `PERCENTILE_POINTS`, in the same order.
    pub size_percentiles: [u64; 5],
}

/// Per-root record handed to the root/pin sink, extended with the
/// `is_duplicate` flag from the seen-roots tracker.
#[derive(Debug, Clone, Serialize)]
pub struct RootRecord {
    pub cid: Vec<u8>,
    pub size_cumulative_dag: u64,
    pub size_cumulative_payload: u64,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceUsage {
    pub elapsed: Duration,
    pub qrb: QrbStats,
    pub hasher_worker_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub layers: Vec<LayerStats>,
    pub roots: Vec<RootRecord>,
    pub resources: ResourceUsage,
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((p * (sorted.len() as f64 - 1.0)).round() as usize).min(sorted.len() - 1);
    sorted[idx]
}

pub fn build_layer_stats(seen: &SeenBlocks) -> Vec<LayerStats> {
    let mut by_origin: std::collections::HashMap<NodeOrigin, Vec<u64>> = std::collections::HashMap::new();
    for (_, record) in seen.records() {
        for origin in record.layers.keys() {
            by_origin.entry(*origin).or_default().push(record.size_block as u64);
        }
    }

    let mut layers: Vec<LayerStats> = by_origin
        .into_iter()
        .map(|(origin, mut sizes)| {
            sizes.sort_unstable();
            let size_percentiles = PERCENTILE_POINTS.map(|p| percentile(&sizes, p));
            LayerStats {
                originating_layer: origin.originating_layer,
                local_sub_layer: origin.local_sub_layer,
                unique_node_count: sizes.len() as u64,
                size_percentiles,
            }
        })
        .collect();

    layers.sort_by_key(|l| (l.originating_layer, l.local_sub_layer));
    layers
}
