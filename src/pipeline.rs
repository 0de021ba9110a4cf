//! The pipeline driver (`Dagger`): composes the QRB, chunker chain, encoder,
//! hasher pool, and collector chain the caller already built into one
//! end-to-end ingestion run.
//!
//! Component assembly (which chunkers, which collectors, which hash
//! algorithm) is the caller's job — the CLI's flag parsing picks concrete
//! types and wires them to a shared `Arc<Encoder>`. `Dagger::new` only takes
//! the already-constructed chain plus the handles it needs to drive shutdown
//! and bookkeeping: the hasher pool (to close and await it) and the encoder's
//! `SeenLog` (to drain it once every CID is guaranteed ready).

use crate::block::DataSource;
use crate::chunker::ChunkerChain;
use crate::collector::CollectorChain;
use crate::encoder::SeenLog;
use crate::error::{DaggerError, IngestError};
use crate::hasher::HasherPool;
use crate::qrb::{Qrb, QrbConfig, QrbStats};
use crate::rope::ByteRope;
use crate::seen::{SeenBlocks, SeenRoots};
use crate::sink::{BlockSink, RootSink, StatsSink};
use crate::stats::{build_layer_stats, ResourceUsage, RootRecord, StatsSummary};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Applies a sequential-access read hint to a raw file descriptor, matching
/// `internal/dagger/ingest_common_unix.go`'s `posix_fadvise(SEQUENTIAL)`
/// call for regular files and named pipes. Callers invoke this once, before
/// handing the fd's `Read` wrapper to [`Dagger::run`]; it is ambient I/O
/// tuning, not part of the driver loop itself. A no-op on non-unix targets.
#[cfg(unix)]
pub fn apply_read_advice(fd: std::os::unix::io::RawFd) {
    use nix::fcntl::{posix_fadvise, PosixFadviseAdvice};
    if let Err(err) = posix_fadvise(fd, 0, 0, PosixFadviseAdvice::POSIX_FADV_SEQUENTIAL) {
        debug!(?err, "posix_fadvise sequential hint failed, ignoring");
    }
}

#[cfg(not(unix))]
pub fn apply_read_advice(_fd: i32) {}

fn merge_qrb_stats(a: QrbStats, b: QrbStats) -> QrbStats {
    QrbStats {
        read_calls: a.read_calls + b.read_calls,
        bytes_read: a.bytes_read + b.bytes_read,
        collisions: a.collisions + b.collisions,
    }
}

/// Drives one pipeline run end to end. Built once per invocation from an
/// already-assembled chunker chain, collector chain, hasher pool, and the
/// encoder's seen-log; consumed by [`Dagger::run`] or [`Dagger::run_multipart`].
pub struct Dagger {
    chunker: ChunkerChain,
    collector: CollectorChain,
    hasher_pool: Arc<HasherPool>,
    hasher_worker_count: usize,
    seen_log: SeenLog,
    qrb_cfg: QrbConfig,
    seen_blocks: SeenBlocks,
    seen_roots: SeenRoots,
    root_records: Vec<RootRecord>,
    qrb_stats: QrbStats,
}

impl Dagger {
    pub fn new(
        chunker: ChunkerChain,
        collector: CollectorChain,
        hasher_pool: Arc<HasherPool>,
        seen_log: SeenLog,
        qrb_cfg: QrbConfig,
    ) -> Self {
        let hasher_worker_count = hasher_pool.worker_count();
        Self {
            chunker,
            collector,
            hasher_pool,
            hasher_worker_count,
            seen_log,
            qrb_cfg,
            seen_blocks: SeenBlocks::new(),
            seen_roots: SeenRoots::new(),
            root_records: Vec::new(),
            qrb_stats: QrbStats::default(),
        }
    }

    /// Runs a single substream (one reader, ending at its own EOF), shuts
    /// the pipeline down, and returns the final statistics summary. Use
    /// this when `multipart_stream` is disabled: the reader's EOF ends the
    /// whole run.
    pub async fn run<R: Read>(
        mut self,
        reader: R,
        block_sink: &mut dyn BlockSink,
        root_sink: &mut dyn RootSink,
        stats_sink: &mut dyn StatsSink,
    ) -> Result<StatsSummary, DaggerError> {
        let start = Instant::now();
        if let Some(root) = self.ingest_substream(reader).await? {
            root_sink.write_root(&root).await?;
            self.root_records.push(root);
        }
        self.finish(start, block_sink, stats_sink).await
    }

    /// Runs several substreams over the same pipeline (`multipart_stream`
    /// enabled): each reader's EOF ends only that substream — its
    /// collector chain is flushed and a root recorded — while the chunker
    /// chain's rolling state and the shared encoder/seen-log/hasher-pool
    /// persist across the whole sequence, since the readers together form
    /// one logical byte stream split by an external repacker (out of
    /// scope). Shutdown happens once, after the last reader.
    pub async fn run_multipart<R: Read, I: IntoIterator<Item = R>>(
        mut self,
        readers: I,
        block_sink: &mut dyn BlockSink,
        root_sink: &mut dyn RootSink,
        stats_sink: &mut dyn StatsSink,
    ) -> Result<StatsSummary, DaggerError> {
        let start = Instant::now();
        for reader in readers {
            if let Some(root) = self.ingest_substream(reader).await? {
                root_sink.write_root(&root).await?;
                self.root_records.push(root);
            }
        }
        self.finish(start, block_sink, stats_sink).await
    }

    /// Ingests one reader to its own EOF: the QRB/chunker/collector loop,
    /// then `flush_state()` head-to-tail and the resulting root, if any,
    /// recorded against the seen-roots tracker.
    async fn ingest_substream<R: Read>(&mut self, mut reader: R) -> Result<Option<RootRecord>, DaggerError> {
        let constants = self.chunker.tail_constants();
        let mut qrb = Qrb::new(&mut reader, self.qrb_cfg)?;

        loop {
            let region = qrb
                .next_region(constants.min_chunk_size, constants.max_chunk_size)
                .map_err(IngestError::Io)?;
            let Some(region) = region else { break };

            // This is the final region for this reader iff the reader has
            // already hit EOF and the region covers everything buffered —
            // no further fill will ever produce more bytes, so the tail
            // chunker must drain it completely instead of waiting for a
            // `min_chunk_size`-sized follow-up that will never arrive.
            let must_consume_all = qrb.reader_exhausted() && region.len() == qrb.buffered_len();
            let bytes = region.bytes();
            let mut events = Vec::new();
            let consumed = self.chunker.split(region.as_slice(), must_consume_all, &mut |ev| {
                events.push(ev);
                Ok(())
            })?;

            let mut cursor = 0usize;
            for ev in events {
                let chunk = bytes.slice(cursor..cursor + ev.size);
                cursor += ev.size;
                let mut meta = HashMap::new();
                if let Some((key, value)) = ev.meta {
                    meta.insert(key, value);
                }
                trace!(size = ev.size, "chunk emitted");
                let ds = DataSource { content: ByteRope::from(chunk), size: ev.size, meta };
                self.collector.ingest(ds).await;
            }

            qrb.release(region, consumed);
        }

        self.qrb_stats = merge_qrb_stats(self.qrb_stats, qrb.stats());

        let root = self.collector.flush().await;
        let Some(header) = root else { return Ok(None) };

        let cid = header.cid().await;
        let is_duplicate = self.seen_roots.observe(&cid);
        let record = RootRecord {
            cid: cid.clone(),
            size_cumulative_dag: header.size_cumulative_dag(),
            size_cumulative_payload: header.size_cumulative_payload(),
            is_duplicate,
        };
        info!(
            cid = %hex::encode(&cid),
            size_cumulative_dag = record.size_cumulative_dag,
            size_cumulative_payload = record.size_cumulative_payload,
            is_duplicate,
            "root completed"
        );
        Ok(Some(record))
    }

    /// Shutdown: close the hasher queue and await every worker, then drain
    /// the seen-log — now that every enqueued CID is guaranteed ready —
    /// into the seen-blocks index, writing each newly-seen block's content
    /// to the block sink before evicting it, and finally emit the
    /// statistics summary.
    async fn finish(
        mut self,
        start: Instant,
        block_sink: &mut dyn BlockSink,
        stats_sink: &mut dyn StatsSink,
    ) -> Result<StatsSummary, DaggerError> {
        // Drop the collector chain first so the encoder's only remaining
        // strong reference is the one the hasher pool tasks (none left,
        // since those were spawned against HashTask's own header clones) and
        // this driver itself hold; this is purely about letting
        // `Arc::try_unwrap` below succeed.
        drop(self.collector);

        match Arc::try_unwrap(self.hasher_pool) {
            Ok(pool) => pool.shutdown().await,
            Err(_) => {
                return Err(DaggerError::Sanity(
                    "hasher pool still referenced at pipeline shutdown".to_string(),
                ))
            }
        }

        let entries = {
            let mut log = self.seen_log.lock().await;
            std::mem::take(&mut *log)
        };

        for (header, origin) in entries {
            let cid = header.cid().await;
            match self.seen_blocks.observe(&header, &cid, origin) {
                Some(true) => {
                    let rope = header.with_content(|rope| rope.clone());
                    block_sink.write_block(&cid, &rope).await?;
                    header.evict_content();
                }
                Some(false) | None => header.evict_content(),
            }
        }

        let resources = ResourceUsage {
            elapsed: start.elapsed(),
            qrb: self.qrb_stats,
            hasher_worker_count: self.hasher_worker_count,
        };
        let summary = StatsSummary {
            layers: build_layer_stats(&self.seen_blocks),
            roots: self.root_records,
            resources,
        };

        stats_sink.write_stats(&summary).await?;
        info!(
            unique_blocks = self.seen_blocks.unique_count(),
            roots = summary.roots.len(),
            elapsed_ms = summary.resources.elapsed.as_millis() as u64,
            "pipeline run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::HashAlgorithm;
    use crate::chunker::fixed::FixedChunker;
    use crate::collector::fixed_outdegree::{FixedOutdegreeCollector, FixedOutdegreeConfig};
    use crate::collector::noop::NoopCollector;
    use crate::encoder::{Encoder, EncoderConfig};
    use crate::sink::InMemorySink;
    use std::io::Cursor;
    use tokio::sync::Mutex as AsyncMutex;

    fn qrb_cfg() -> QrbConfig {
        QrbConfig { min_region: 4, max_region: 64, sector_quantum: 8, total_buffer_size: 256 }
    }

    fn encoder_cfg() -> EncoderConfig {
        EncoderConfig {
            protobuf_leaves: false,
            hash_algorithm: HashAlgorithm::Sha2_256,
            cid_hash_size: 32,
            inline_max_size: 0,
            legacy_cidv0_links: false,
            tsize_links: true,
        }
    }

    fn build_dagger(max_outdegree: usize) -> Dagger {
        let seen_log: SeenLog = Arc::new(AsyncMutex::new(Vec::new()));
        let hasher_pool = Arc::new(HasherPool::new(0));
        let encoder =
            Arc::new(Encoder::new(encoder_cfg(), Some(hasher_pool.clone())).unwrap().with_seen_log(seen_log.clone()));
        let collector = CollectorChain::new(vec![Box::new(
            FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree }, encoder.clone(), 0).unwrap(),
        )])
        .unwrap();
        let chunker = ChunkerChain::new(vec![Box::new(FixedChunker::new(4).unwrap())]).unwrap();
        Dagger::new(chunker, collector, hasher_pool, seen_log, qrb_cfg())
    }

    fn build_noop_dagger() -> Dagger {
        let seen_log: SeenLog = Arc::new(AsyncMutex::new(Vec::new()));
        let hasher_pool = Arc::new(HasherPool::new(0));
        let encoder =
            Arc::new(Encoder::new(encoder_cfg(), Some(hasher_pool.clone())).unwrap().with_seen_log(seen_log.clone()));
        let collector = CollectorChain::new(vec![Box::new(NoopCollector::new(encoder.clone()))]).unwrap();
        let chunker = ChunkerChain::new(vec![Box::new(FixedChunker::new(4).unwrap())]).unwrap();
        Dagger::new(chunker, collector, hasher_pool, seen_log, qrb_cfg())
    }

    #[tokio::test]
    async fn empty_stream_has_no_root() {
        let dagger = build_noop_dagger();
        let (mut blocks, mut roots, mut stats) = (InMemorySink::default(), InMemorySink::default(), InMemorySink::default());
        let summary = dagger
            .run(Cursor::new(Vec::new()), &mut blocks, &mut roots, &mut stats)
            .await
            .unwrap();
        assert!(summary.roots.is_empty());
        assert_eq!(summary.layers.iter().map(|l| l.unique_node_count).sum::<u64>(), 0);
    }

    #[tokio::test]
    async fn small_input_produces_root_and_writes_blocks() {
        let dagger = build_dagger(4);
        let mut blocks = InMemorySink::default();
        let mut roots = InMemorySink::default();
        let mut stats = InMemorySink::default();
        let summary = dagger
            .run(Cursor::new(b"abcdefgh".to_vec()), &mut blocks, &mut roots, &mut stats)
            .await
            .unwrap();

        assert_eq!(summary.roots.len(), 1);
        assert_eq!(summary.roots[0].size_cumulative_payload, 8);
        assert!(!summary.roots[0].is_duplicate);
        assert_eq!(roots.roots.len(), 1);
        assert!(!blocks.blocks.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_substream_flags_duplicate_root() {
        let dagger = build_dagger(4);
        let mut blocks = InMemorySink::default();
        let mut roots = InMemorySink::default();
        let mut stats = InMemorySink::default();
        let parts = vec![Cursor::new(b"1234".to_vec()), Cursor::new(b"1234".to_vec())];
        let summary = dagger.run_multipart(parts, &mut blocks, &mut roots, &mut stats).await.unwrap();

        assert_eq!(summary.roots.len(), 2);
        assert!(!summary.roots[0].is_duplicate);
        assert!(summary.roots[1].is_duplicate);
    }

    #[tokio::test]
    async fn noop_collector_discards_everything_and_yields_no_root() {
        let dagger = build_noop_dagger();
        let mut blocks = InMemorySink::default();
        let mut roots = InMemorySink::default();
        let mut stats = InMemorySink::default();
        let summary = dagger
            .run(Cursor::new(b"some bytes to chunk".to_vec()), &mut blocks, &mut roots, &mut stats)
            .await
            .unwrap();
        assert!(summary.roots.is_empty());
        assert!(roots.roots.is_empty());
    }
}
