//! Whole-pipeline scenarios driven through `Dagger::run`/`run_multipart`
//! against in-memory sinks, pinning the exact CID bytes a handful of
//! well-known inputs must produce.

use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::Arc;
use streamdag::chunker::fixed::FixedChunker;
use streamdag::chunker::padfinder::{PadfinderChunker, PadfinderConfig};
use streamdag::chunker::rabin::{RabinChunker, RabinConfig};
use streamdag::chunker::ChunkerChain;
use streamdag::cid::HashAlgorithm;
use streamdag::collector::fixed_outdegree::{FixedOutdegreeCollector, FixedOutdegreeConfig};
use streamdag::collector::shrubber::{ShrubberCollector, ShrubberConfig};
use streamdag::collector::trickle::{TrickleCollector, TrickleConfig};
use streamdag::collector::CollectorChain;
use streamdag::encoder::{Encoder, EncoderConfig};
use streamdag::hasher::HasherPool;
use streamdag::qrb::QrbConfig;
use streamdag::sink::InMemorySink;
use streamdag::Dagger;
use tokio::sync::Mutex as AsyncMutex;

fn qrb_cfg() -> QrbConfig {
    QrbConfig { min_region: 4096, max_region: 1_048_576, sector_quantum: 4096, total_buffer_size: 8_388_608 }
}

fn build_dagger(
    chunker: ChunkerChain,
    collector_factory: impl FnOnce(Arc<dyn streamdag::encoder::NodeEncoder>) -> CollectorChain,
    encoder_cfg: EncoderConfig,
    async_workers: usize,
) -> Dagger {
    let seen_log = Arc::new(AsyncMutex::new(Vec::new()));
    let hasher_pool = Arc::new(HasherPool::new(async_workers));
    let encoder =
        Arc::new(Encoder::new(encoder_cfg, Some(hasher_pool.clone())).unwrap().with_seen_log(seen_log.clone()));
    let collector = collector_factory(encoder);
    Dagger::new(chunker, collector, hasher_pool, seen_log, qrb_cfg())
}

fn sha2_encoder_cfg(inline_max_size: usize) -> EncoderConfig {
    EncoderConfig {
        protobuf_leaves: false,
        hash_algorithm: HashAlgorithm::Sha2_256,
        cid_hash_size: 32,
        inline_max_size,
        legacy_cidv0_links: false,
        tsize_links: true,
    }
}

#[tokio::test]
async fn empty_stream_yields_no_root() {
    let chunker = ChunkerChain::new(vec![Box::new(FixedChunker::new(4096).unwrap())]).unwrap();
    let dagger = build_dagger(
        chunker,
        |encoder| {
            CollectorChain::new(vec![Box::new(
                FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 174 }, encoder, 0).unwrap(),
            )])
            .unwrap()
        },
        sha2_encoder_cfg(0),
        0,
    );

    let mut blocks = InMemorySink::default();
    let mut roots = InMemorySink::default();
    let mut stats = InMemorySink::default();
    let summary = dagger
        .run(Cursor::new(Vec::new()), &mut blocks, &mut roots, &mut stats)
        .await
        .unwrap();

    assert!(summary.roots.is_empty());
    assert!(blocks.blocks.is_empty());
}

#[tokio::test]
async fn single_byte_with_inline_threshold_yields_identity_cid() {
    let chunker = ChunkerChain::new(vec![Box::new(FixedChunker::new(4096).unwrap())]).unwrap();
    let dagger = build_dagger(
        chunker,
        |encoder| {
            CollectorChain::new(vec![Box::new(
                FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 174 }, encoder, 0).unwrap(),
            )])
            .unwrap()
        },
        sha2_encoder_cfg(1),
        0,
    );

    let mut blocks = InMemorySink::default();
    let mut roots = InMemorySink::default();
    let mut stats = InMemorySink::default();
    let summary = dagger
        .run(Cursor::new(vec![0x41]), &mut blocks, &mut roots, &mut stats)
        .await
        .unwrap();

    assert_eq!(summary.roots.len(), 1);
    assert_eq!(summary.roots[0].cid, vec![0x01, 0x55, 0x00, 0x01, 0x41]);
    // inlined blocks never reach the block sink.
    assert!(blocks.blocks.is_empty());
}

#[tokio::test]
async fn sixty_four_kib_of_zeros_is_a_single_leaf_with_sha256_cid() {
    let chunker = ChunkerChain::new(vec![Box::new(RabinChunker::new(RabinConfig::default()).unwrap())]).unwrap();
    let dagger = build_dagger(
        chunker,
        |encoder| {
            CollectorChain::new(vec![Box::new(
                FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 174 }, encoder, 0).unwrap(),
            )])
            .unwrap()
        },
        sha2_encoder_cfg(0),
        0,
    );

    let input = vec![0u8; 65_536];
    let mut blocks = InMemorySink::default();
    let mut roots = InMemorySink::default();
    let mut stats = InMemorySink::default();
    let summary = dagger
        .run(Cursor::new(input.clone()), &mut blocks, &mut roots, &mut stats)
        .await
        .unwrap();

    assert_eq!(summary.roots.len(), 1);
    let digest = Sha256::digest(&input);
    let mut expected = vec![0x01, 0x55, 0x12, 0x20];
    expected.extend_from_slice(&digest);
    assert_eq!(summary.roots[0].cid, expected);
    assert_eq!(summary.roots[0].size_cumulative_payload, 65_536);
    assert_eq!(blocks.blocks.len(), 1);
}

#[tokio::test]
async fn ten_mib_random_bytes_root_cid_is_independent_of_hasher_worker_count() {
    let input: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

    let mut last_cid: Option<Vec<u8>> = None;
    for workers in [0usize, 1, 8] {
        let chunker =
            ChunkerChain::new(vec![Box::new(RabinChunker::new(RabinConfig::default()).unwrap())]).unwrap();
        let dagger = build_dagger(
            chunker,
            |encoder| {
                CollectorChain::new(vec![Box::new(
                    TrickleCollector::new(
                        TrickleConfig { max_direct_leaves: 174, max_sibling_subgroups: 4 },
                        encoder,
                        0,
                    )
                    .unwrap(),
                )])
                .unwrap()
            },
            sha2_encoder_cfg(0),
            workers,
        );

        let mut blocks = InMemorySink::default();
        let mut roots = InMemorySink::default();
        let mut stats = InMemorySink::default();
        let summary = dagger
            .run(Cursor::new(input.clone()), &mut blocks, &mut roots, &mut stats)
            .await
            .unwrap();

        assert_eq!(summary.roots.len(), 1);
        let cid = summary.roots[0].cid.clone();
        if let Some(prev) = &last_cid {
            assert_eq!(prev, &cid, "root cid changed with hasher worker count {workers}");
        }
        last_cid = Some(cid);
    }
}

#[tokio::test]
async fn padding_run_is_clustered_by_the_shrubber() {
    let chunker = ChunkerChain::new(vec![
        Box::new(PadfinderChunker::new(PadfinderConfig { min_run: 16, max_chunk: 1024 }).unwrap()),
        Box::new(FixedChunker::new(4096).unwrap()),
    ])
    .unwrap();

    let dagger = build_dagger(
        chunker,
        |encoder| {
            let shrubber = Box::new(
                ShrubberCollector::new(
                    ShrubberConfig {
                        max_payload: 0,
                        repeater_layer_nodes: 4,
                        subgroup_cid_mask_bits: 8,
                        subgroup_cid_target: 0,
                        subgroup_cid_min_nodes: 1,
                    },
                    encoder.clone(),
                    0,
                )
                .unwrap(),
            );
            let tail = Box::new(
                FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 174 }, encoder, 1).unwrap(),
            );
            CollectorChain::new(vec![shrubber, tail]).unwrap()
        },
        sha2_encoder_cfg(0),
        0,
    );

    let input = vec![0u8; 1024 * 1024];
    let mut blocks = InMemorySink::default();
    let mut roots = InMemorySink::default();
    let mut stats = InMemorySink::default();
    let summary = dagger
        .run(Cursor::new(input), &mut blocks, &mut roots, &mut stats)
        .await
        .unwrap();

    assert_eq!(summary.roots.len(), 1);
    assert_eq!(summary.roots[0].size_cumulative_payload, 1024 * 1024);
}

#[tokio::test]
async fn legacy_cidv0_rejects_non_sha256_256_configurations() {
    let bad = EncoderConfig {
        protobuf_leaves: false,
        hash_algorithm: HashAlgorithm::Blake2b256,
        cid_hash_size: 32,
        inline_max_size: 0,
        legacy_cidv0_links: true,
        tsize_links: true,
    };
    assert!(Encoder::new(bad, None).is_err());

    let bad_size = EncoderConfig {
        protobuf_leaves: false,
        hash_algorithm: HashAlgorithm::Sha2_256,
        cid_hash_size: 20,
        inline_max_size: 0,
        legacy_cidv0_links: true,
        tsize_links: true,
    };
    assert!(Encoder::new(bad_size, None).is_err());

    let ok = EncoderConfig {
        protobuf_leaves: false,
        hash_algorithm: HashAlgorithm::Sha2_256,
        cid_hash_size: 32,
        inline_max_size: 0,
        legacy_cidv0_links: true,
        tsize_links: true,
    };
    assert!(Encoder::new(ok, None).is_ok());
}

#[tokio::test]
async fn repeated_multipart_substreams_flag_duplicate_roots() {
    let chunker = ChunkerChain::new(vec![Box::new(FixedChunker::new(4).unwrap())]).unwrap();
    let dagger = build_dagger(
        chunker,
        |encoder| {
            CollectorChain::new(vec![Box::new(
                FixedOutdegreeCollector::new(FixedOutdegreeConfig { max_outdegree: 4 }, encoder, 0).unwrap(),
            )])
            .unwrap()
        },
        sha2_encoder_cfg(0),
        0,
    );

    let mut blocks = InMemorySink::default();
    let mut roots = InMemorySink::default();
    let mut stats = InMemorySink::default();
    let parts = vec![Cursor::new(b"abcd".to_vec()), Cursor::new(b"abcd".to_vec()), Cursor::new(b"efgh".to_vec())];
    let summary = dagger.run_multipart(parts, &mut blocks, &mut roots, &mut stats).await.unwrap();

    assert_eq!(summary.roots.len(), 3);
    assert!(!summary.roots[0].is_duplicate);
    assert!(summary.roots[1].is_duplicate);
    assert!(!summary.roots[2].is_duplicate);
}
