//! Converts leaf data and link-node child lists into serialized block bytes,
//! then hands the bytes to the CID-computation policy (inline / dummy /
//! synchronous hash / async hash).

mod pb;

use crate::block::{DataSource, Header, PendingCidSetter};
use crate::cid::{self, Codec, CodecTable, HashAlgorithm};
use crate::error::ConfigError;
use crate::hasher::{HashTask, HasherPool};
use crate::limits::MAX_BLOCK_WIRE_SIZE;
use crate::rope::ByteRope;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Every header the encoder constructs, tagged with the origin it was built
/// for. The pipeline driver drains this after shutdown (once every CID is
/// guaranteed ready, hasher pool included) to populate the seen-blocks index
/// and the per-layer statistics, without making the hot construction path
/// wait on a background hash.
pub type SeenLog = Arc<AsyncMutex<Vec<(Arc<Header>, NodeOrigin)>>>;

/// Identifies where a node came from for statistics layering: `-1` marks a
/// leaf-origin node (chunker output or shrubber padding synthesis), any
/// other value is a collector's position in the chain. `local_sub_layer`
/// distinguishes sub-kinds within a layer (data/padding/padding-superblock
/// for leaf origins; stack depth for collector origins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeOrigin {
    pub originating_layer: i32,
    pub local_sub_layer: i32,
}

impl NodeOrigin {
    pub const LEAF_DATA: NodeOrigin = NodeOrigin { originating_layer: -1, local_sub_layer: 0 };
    pub const LEAF_PADDING: NodeOrigin = NodeOrigin { originating_layer: -1, local_sub_layer: 1 };
    pub const LEAF_PADDING_SUPERBLOCK: NodeOrigin = NodeOrigin { originating_layer: -1, local_sub_layer: 2 };

    pub fn collector(chain_position: i32, stack_layer: i32) -> Self {
        NodeOrigin { originating_layer: chain_position, local_sub_layer: stack_layer }
    }
}

/// Shared, read-only handle every collector holds to turn its buffered
/// leaves/children into blocks.
#[async_trait]
pub trait NodeEncoder: Send + Sync {
    async fn new_leaf(&self, ds: DataSource, origin: NodeOrigin) -> Arc<Header>;
    async fn new_link(&self, origin: NodeOrigin, children: &[Arc<Header>]) -> Arc<Header>;
}

/// Validated encoder configuration. `protobuf_leaves` selects the PB-framed
/// leaf format (codec stays raw-payload either way: only the wire framing
/// changes to add a length field, matching UnixFSv1's raw leaf decorator).
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub protobuf_leaves: bool,
    pub hash_algorithm: HashAlgorithm,
    pub cid_hash_size: usize,
    pub inline_max_size: usize,
    pub legacy_cidv0_links: bool,
    pub tsize_links: bool,
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();
        if let Some(native) = self.hash_algorithm.native_digest_len() {
            if native < self.cid_hash_size {
                errs.push(format!(
                    "selected hash function does not produce a digest satisfying the requested {} cid hash bytes",
                    self.cid_hash_size
                ));
            }
        }
        if self.legacy_cidv0_links
            && (self.hash_algorithm != HashAlgorithm::Sha2_256 || self.cid_hash_size != 32)
        {
            errs.push("legacy CIDv0 linking requires sha2-256 with 256-bit digests".to_string());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(errs))
        }
    }
}

/// The in-scope encoder: raw or length-prefixed-PB leaves, PB-link nodes.
pub struct Encoder {
    cfg: EncoderConfig,
    codecs: CodecTable,
    hasher_pool: Option<Arc<HasherPool>>,
    seen_log: Option<SeenLog>,
}

impl Encoder {
    pub fn new(cfg: EncoderConfig, hasher_pool: Option<Arc<HasherPool>>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let multihash_id = cfg.hash_algorithm.multihash_id().unwrap_or(0);
        Ok(Self {
            codecs: CodecTable::new(multihash_id, cfg.cid_hash_size),
            cfg,
            hasher_pool,
            seen_log: None,
        })
    }

    /// Attaches the shared log the pipeline driver drains after shutdown to
    /// build the seen-blocks index and per-layer statistics.
    pub fn with_seen_log(mut self, seen_log: SeenLog) -> Self {
        self.seen_log = Some(seen_log);
        self
    }

    fn leaf_codec(&self) -> Codec {
        if self.cfg.protobuf_leaves {
            Codec::PbLink
        } else {
            Codec::Raw
        }
    }

    /// Runs the block-header factory's CID computation policy (spec 4.4):
    /// identity inlining, dummy, synchronous hash, or enqueue-to-pool.
    async fn build_header(
        &self,
        origin: NodeOrigin,
        codec: Codec,
        content: ByteRope,
        size_cumulative_payload: u64,
        size_cumulative_dag_children: u64,
    ) -> Arc<Header> {
        let content_size = content.size();
        crate::sanity_check!(
            content_size <= MAX_BLOCK_WIRE_SIZE,
            "serialized block exceeds the hard maximum wire size"
        );
        let size_cumulative_dag = size_cumulative_dag_children + content_size as u64;

        let header = if self.cfg.inline_max_size > 0 && content_size <= self.cfg.inline_max_size {
            let bytes = content.append_to(Vec::with_capacity(content_size));
            let cid = cid::build_identity_cid(codec, &bytes)
                .expect("identity CID construction cannot fail for an in-range codec");
            Arc::new(Header::with_ready_cid(
                content,
                cid,
                size_cumulative_payload,
                size_cumulative_dag,
                true,
                false,
            ))
        } else {
            let meta = self
                .codecs
                .meta(codec)
                .expect("codec ids are validated at construction time");

            if self.cfg.hash_algorithm == HashAlgorithm::None {
                Arc::new(Header::with_ready_cid(
                    content,
                    meta.dummy_cid,
                    size_cumulative_payload,
                    size_cumulative_dag,
                    false,
                    true,
                ))
            } else {
                match &self.hasher_pool {
                    Some(pool) if pool.is_async() => {
                        let (header, setter) = Header::with_pending_cid(
                            content,
                            size_cumulative_payload,
                            size_cumulative_dag,
                        );
                        let header = Arc::new(header);
                        pool.enqueue(HashTask {
                            header: header.clone(),
                            setter,
                            algorithm: self.cfg.hash_algorithm,
                            digest_len: self.cfg.cid_hash_size,
                            cid_prefix: meta.hashed_cid_prefix,
                        })
                        .await;
                        header
                    }
                    _ => {
                        let digest = header_digest_synchronously(self, &content);
                        let mut cid = meta.hashed_cid_prefix;
                        cid.extend_from_slice(&digest);
                        Arc::new(Header::with_ready_cid(
                            content,
                            cid,
                            size_cumulative_payload,
                            size_cumulative_dag,
                            false,
                            false,
                        ))
                    }
                }
            }
        };

        if let Some(log) = &self.seen_log {
            log.lock().await.push((header.clone(), origin));
        }

        header
    }
}

fn header_digest_synchronously(enc: &Encoder, content: &ByteRope) -> Vec<u8> {
    enc.cfg.hash_algorithm.digest(content, enc.cfg.cid_hash_size)
}

#[async_trait]
impl NodeEncoder for Encoder {
    async fn new_leaf(&self, ds: DataSource, origin: NodeOrigin) -> Arc<Header> {
        let codec = self.leaf_codec();
        let content = if self.cfg.protobuf_leaves {
            pb::frame_leaf(&ds.content)
        } else {
            ds.content.clone()
        };
        self.build_header(origin, codec, content, ds.size as u64, 0).await
    }

    async fn new_link(&self, origin: NodeOrigin, children: &[Arc<Header>]) -> Arc<Header> {
        let mut cids = Vec::with_capacity(children.len());
        for child in children {
            cids.push(child.cid().await);
        }
        let content = pb::frame_link(
            &cids,
            children,
            self.cfg.tsize_links,
            self.cfg.legacy_cidv0_links,
        );
        let payload: u64 = children.iter().map(|c| c.size_cumulative_payload()).sum();
        let dag_children: u64 = children.iter().map(|c| c.size_cumulative_dag()).sum();
        self.build_header(origin, Codec::PbLink, content, payload, dag_children).await
    }
}
