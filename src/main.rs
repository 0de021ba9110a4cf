//! `streamdag`: CLI front-end wiring a chunker chain, an encoder, a hasher
//! pool, and a collector chain into one [`streamdag::Dagger`] run.
//!
//! Each chunker/collector stage is given as its own `--chunker`/`--collector`
//! occurrence (processed in the order given, forming the chain), carrying a
//! `key=value,...` argument string that the stage's own config struct
//! validates.

use bytesize::ByteSize;
use clap::Parser;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use streamdag::cid::HashAlgorithm;
use streamdag::chunker::buzhash::{BuzhashChunker, BuzhashConfig};
use streamdag::chunker::fixed::FixedChunker;
use streamdag::chunker::padfinder::{PadfinderChunker, PadfinderConfig};
use streamdag::chunker::pigz::{PigzChunker, PigzConfig};
use streamdag::chunker::rabin::{RabinChunker, RabinConfig};
use streamdag::chunker::{Chunker, ChunkerChain};
use streamdag::collector::fixed_cid_refs_size::{FixedCidRefsSizeCollector, FixedCidRefsSizeConfig};
use streamdag::collector::fixed_outdegree::{FixedOutdegreeCollector, FixedOutdegreeConfig};
use streamdag::collector::noop::NoopCollector;
use streamdag::collector::shrubber::{ShrubberCollector, ShrubberConfig};
use streamdag::collector::trickle::{TrickleCollector, TrickleConfig};
use streamdag::collector::{Collector, CollectorChain};
use streamdag::encoder::{Encoder, EncoderConfig, NodeEncoder, SeenLog};
use streamdag::error::{ConfigError, DaggerError};
use streamdag::hasher::HasherPool;
use streamdag::pipeline::{apply_read_advice, Dagger};
use streamdag::qrb::QrbConfig;
use streamdag::rope::ByteRope;
use streamdag::sink::{BlockSink, NullSink, RootSink, StatsSink};
use streamdag::stats::{RootRecord, StatsSummary};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, Level};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// `key=value,key=value` spec parser shared by every chained stage flag.
fn parse_spec(spec: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in spec.split(',').filter(|s| !s.is_empty()) {
        match pair.split_once('=') {
            Some((k, v)) => {
                out.insert(k.trim().to_string(), v.trim().to_string());
            }
            None => {
                out.insert(pair.trim().to_string(), String::new());
            }
        }
    }
    out
}

fn field<T: std::str::FromStr>(spec: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError> {
    match spec.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::single(format!("'{key}' has an invalid value: '{raw}'"))),
    }
}

/// One `--chunker NAME[:key=value,...]` occurrence.
#[derive(Clone, Debug)]
struct StageSpec {
    name: String,
    spec: HashMap<String, String>,
}

impl std::str::FromStr for StageSpec {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, rest)) => Ok(StageSpec { name: name.to_string(), spec: parse_spec(rest) }),
            None => Ok(StageSpec { name: s.to_string(), spec: HashMap::new() }),
        }
    }
}

fn build_chunker(stage: &StageSpec) -> Result<Box<dyn Chunker>, ConfigError> {
    let s = &stage.spec;
    match stage.name.as_str() {
        "fixed" => Ok(Box::new(FixedChunker::new(field(s, "size", 262_144)?)?)),
        "buzhash" => Ok(Box::new(BuzhashChunker::new(BuzhashConfig {
            target: field(s, "target", 0)?,
            mask_bits: field(s, "mask-bits", 13)?,
            min_size: field(s, "min", 256)?,
            max_size: field(s, "max", 131_072)?,
            xor_table: field(s, "table", "default".to_string())?,
        })?)),
        "rabin" => {
            let default = RabinConfig::default();
            Ok(Box::new(RabinChunker::new(RabinConfig {
                polynomial: field(s, "polynomial", default.polynomial)?,
                target: field(s, "target", default.target)?,
                mask_bits: field(s, "mask-bits", default.mask_bits)?,
                window_size: field(s, "window", default.window_size)?,
                min_size: field(s, "min", default.min_size)?,
                max_size: field(s, "max", default.max_size)?,
            })?))
        }
        "padfinder" => {
            let default = PadfinderConfig::default();
            Ok(Box::new(PadfinderChunker::new(PadfinderConfig {
                min_run: field(s, "min-run", default.min_run)?,
                max_chunk: field(s, "max-chunk", default.max_chunk)?,
            })?))
        }
        "pigz" => {
            let default = PigzConfig::default();
            Ok(Box::new(PigzChunker::new(PigzConfig {
                min_size: field(s, "min", default.min_size)?,
                max_size: field(s, "max", default.max_size)?,
            })?))
        }
        other => Err(ConfigError::single(format!("unknown chunker '{other}'"))),
    }
}

fn build_collector(
    stage: &StageSpec,
    encoder: Arc<dyn NodeEncoder>,
    chain_position: i32,
) -> Result<Box<dyn Collector>, ConfigError> {
    let s = &stage.spec;
    match stage.name.as_str() {
        "fixed-outdegree" => Ok(Box::new(FixedOutdegreeCollector::new(
            FixedOutdegreeConfig { max_outdegree: field(s, "max-outdegree", 174)? },
            encoder,
            chain_position,
        )?)),
        "fixed-cid-refs-size" => Ok(Box::new(FixedCidRefsSizeCollector::new(
            FixedCidRefsSizeConfig { max_cid_refs_size: field(s, "max-cid-refs-size", 8192)? },
            encoder,
            chain_position,
        )?)),
        "trickle" => Ok(Box::new(TrickleCollector::new(
            TrickleConfig {
                max_direct_leaves: field(s, "direct-leaves", 174)?,
                max_sibling_subgroups: field(s, "sibling-subgroups", 4)?,
            },
            encoder,
            chain_position,
        )?)),
        "shrubber" => Ok(Box::new(ShrubberCollector::new(
            ShrubberConfig {
                max_payload: field(s, "max-payload", 1_048_576)?,
                repeater_layer_nodes: field(s, "repeater-layer-nodes", 4)?,
                subgroup_cid_mask_bits: field(s, "subgroup-mask-bits", 8)?,
                subgroup_cid_target: field(s, "subgroup-target", 0)?,
                subgroup_cid_min_nodes: field(s, "subgroup-min-nodes", 4)?,
            },
            encoder,
            chain_position,
        )?)),
        "noop" => Ok(Box::new(NoopCollector::new(encoder))),
        other => Err(ConfigError::single(format!("unknown collector '{other}'"))),
    }
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum SinkKind {
    Stdout,
    None,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input files to ingest. Repeat to form a multipart run: each file's
    /// EOF closes only its own substream. Omit for stdin.
    #[arg(short, long)]
    input: Vec<std::path::PathBuf>,

    /// Chunker chain stage, in order. Repeatable. `NAME[:key=value,...]`,
    /// NAME one of fixed, buzhash, rabin, padfinder, pigz.
    #[arg(long = "chunker", default_values = ["rabin"])]
    chunkers: Vec<StageSpec>,

    /// Collector chain stage, in order. Repeatable. `NAME[:key=value,...]`,
    /// NAME one of fixed-outdegree, fixed-cid-refs-size, trickle, shrubber,
    /// noop. The last stage must be a terminal collector (anything but
    /// shrubber).
    #[arg(long = "collector", default_values = ["fixed-outdegree"])]
    collectors: Vec<StageSpec>,

    /// Digest algorithm for non-inlined blocks.
    #[arg(long, default_value = "sha2-256")]
    hash_algorithm: String,

    /// Truncated digest length, in bytes.
    #[arg(long, default_value_t = 32)]
    hash_size: usize,

    /// Blocks at or under this serialized size are identity-inlined into
    /// their own CID instead of hashed. `0` disables inlining.
    #[arg(long, default_value_t = 0)]
    inline_max_size: usize,

    /// Frame leaves with the length-prefixed protobuf wrapper instead of
    /// raw bytes.
    #[arg(long)]
    protobuf_leaves: bool,

    /// Emit legacy CIDv0 link references (requires sha2-256/32-byte digests).
    #[arg(long)]
    legacy_cidv0_links: bool,

    /// Omit the UnixFSv1 Tsize hint from link references.
    #[arg(long)]
    no_tsize_links: bool,

    /// Number of background hashing workers. `0` hashes synchronously on
    /// the ingest task.
    #[arg(long, default_value_t = 0)]
    async_hashers: usize,

    #[arg(long, default_value_t = 4096)]
    qrb_min_region: usize,
    #[arg(long, default_value_t = 1_048_576)]
    qrb_max_region: usize,
    #[arg(long, default_value_t = 4096)]
    qrb_sector_quantum: usize,
    #[arg(long, default_value_t = 8_388_608)]
    qrb_total_buffer_size: usize,

    /// Where the resulting blocks/roots/stats are written.
    #[arg(long, value_enum, default_value = "stdout")]
    sink: SinkKind,

    /// Switch structured logging to JSON.
    #[arg(long)]
    json_logs: bool,

    /// Logging verbosity.
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

fn init_tracing(args: &Args) {
    let level: Level = args.verbosity.parse().unwrap_or(Level::INFO);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    // leak the guard: the binary runs to completion in `main`, so there is no
    // later point at which flushing on drop would matter.
    Box::leak(Box::new(guard));

    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    if args.json_logs {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking_writer)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(layer).init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(false)
            .with_writer(non_blocking_writer)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(layer).init();
    }
}

struct StdoutBlockSink;

#[async_trait::async_trait]
impl BlockSink for StdoutBlockSink {
    async fn write_block(&mut self, cid: &[u8], content: &ByteRope) -> Result<(), streamdag::error::SinkError> {
        println!("block {} {}", hex::encode(cid), content.size());
        Ok(())
    }
}

struct StdoutRootSink;

#[async_trait::async_trait]
impl RootSink for StdoutRootSink {
    async fn write_root(&mut self, record: &RootRecord) -> Result<(), streamdag::error::SinkError> {
        println!(
            "root {} dag={} payload={} duplicate={}",
            hex::encode(&record.cid),
            ByteSize(record.size_cumulative_dag),
            ByteSize(record.size_cumulative_payload),
            record.is_duplicate
        );
        Ok(())
    }
}

struct StdoutStatsSink;

#[async_trait::async_trait]
impl StatsSink for StdoutStatsSink {
    async fn write_stats(&mut self, summary: &StatsSummary) -> Result<(), streamdag::error::SinkError> {
        match serde_json::to_string_pretty(summary) {
            Ok(json) => println!("{json}"),
            Err(err) => error!(?err, "failed to serialize stats summary"),
        }
        Ok(())
    }
}

fn build_dagger(args: &Args) -> Result<Dagger, ConfigError> {
    let encoder_cfg = EncoderConfig {
        protobuf_leaves: args.protobuf_leaves,
        hash_algorithm: HashAlgorithm::parse(&args.hash_algorithm)
            .ok_or_else(|| ConfigError::single(format!("unknown hash algorithm '{}'", args.hash_algorithm)))?,
        cid_hash_size: args.hash_size,
        inline_max_size: args.inline_max_size,
        legacy_cidv0_links: args.legacy_cidv0_links,
        tsize_links: !args.no_tsize_links,
    };

    let hasher_pool = Arc::new(HasherPool::new(args.async_hashers));
    let seen_log: SeenLog = Arc::new(AsyncMutex::new(Vec::new()));
    let encoder: Arc<dyn NodeEncoder> =
        Arc::new(Encoder::new(encoder_cfg, Some(hasher_pool.clone()))?.with_seen_log(seen_log.clone()));

    if args.collectors.is_empty() {
        return Err(ConfigError::single("at least one --collector stage is required"));
    }
    let mut collector_stages = Vec::with_capacity(args.collectors.len());
    for (i, stage) in args.collectors.iter().enumerate() {
        collector_stages.push(build_collector(stage, encoder.clone(), i as i32)?);
    }
    let collector = CollectorChain::new(collector_stages)?;

    if args.chunkers.is_empty() {
        return Err(ConfigError::single("at least one --chunker stage is required"));
    }
    let mut chunker_stages = Vec::with_capacity(args.chunkers.len());
    for stage in &args.chunkers {
        chunker_stages.push(build_chunker(stage)?);
    }
    let chunker = ChunkerChain::new(chunker_stages)?;

    let qrb_cfg = QrbConfig {
        min_region: args.qrb_min_region,
        max_region: args.qrb_max_region,
        sector_quantum: args.qrb_sector_quantum,
        total_buffer_size: args.qrb_total_buffer_size,
    };

    Ok(Dagger::new(chunker, collector, hasher_pool, seen_log, qrb_cfg))
}

async fn run(args: Args) -> Result<(), DaggerError> {
    let dagger = build_dagger(&args)?;

    let (mut block_sink, mut root_sink, mut stats_sink): (
        Box<dyn BlockSink>,
        Box<dyn RootSink>,
        Box<dyn StatsSink>,
    ) = match args.sink {
        SinkKind::Stdout => (Box::new(StdoutBlockSink), Box::new(StdoutRootSink), Box::new(StdoutStatsSink)),
        SinkKind::None => (Box::new(NullSink), Box::new(NullSink), Box::new(NullSink)),
    };

    if args.input.is_empty() {
        let stdin = io::stdin();
        dagger.run(stdin.lock(), block_sink.as_mut(), root_sink.as_mut(), stats_sink.as_mut()).await?;
    } else if args.input.len() == 1 {
        let file = File::open(&args.input[0]).map_err(streamdag::error::IngestError::Io)?;
        #[cfg(unix)]
        apply_read_advice(std::os::unix::io::AsRawFd::as_raw_fd(&file));
        dagger.run(file, block_sink.as_mut(), root_sink.as_mut(), stats_sink.as_mut()).await?;
    } else {
        let mut readers: Vec<File> = Vec::with_capacity(args.input.len());
        for path in &args.input {
            let file = File::open(path).map_err(streamdag::error::IngestError::Io)?;
            #[cfg(unix)]
            apply_read_advice(std::os::unix::io::AsRawFd::as_raw_fd(&file));
            readers.push(file);
        }
        dagger
            .run_multipart(readers, block_sink.as_mut(), root_sink.as_mut(), stats_sink.as_mut())
            .await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "streamdag run failed");
            ExitCode::FAILURE
        }
    }
}
