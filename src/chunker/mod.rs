//! The chunker chain: pluggable components that partition a byte buffer into
//! variable-size chunks.

pub mod buzhash;
pub mod fixed;
pub mod padfinder;
pub mod pigz;
pub mod rabin;

use crate::error::ChunkerError;

/// Shape constants a chunker constructor derives from its configuration, used
/// by the pipeline driver to size QRB region requests against the *tail*
/// chunker in the chain.
#[derive(Debug, Clone, Copy)]
pub struct InstanceConstants {
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

/// A single emitted chunk boundary: its size, and optional domain metadata
/// (e.g. padfinder's `padding-cluster-atom-hex`) the shrubber collector
/// recognizes.
#[derive(Debug, Clone)]
pub struct ChunkEvent {
    pub size: usize,
    pub meta: Option<(String, String)>,
}

pub type EmitFn<'a> = dyn FnMut(ChunkEvent) -> Result<(), ChunkerError> + 'a;

/// `split` is handed the longest contiguous buffer the ring buffer currently
/// has available. It emits zero or more chunk boundaries via `emit` and
/// returns how many bytes of `buf`, from the front, it accounted for (by
/// emitting them as chunks). Any unconsumed suffix is offered to the next
/// chunker in the chain; the last chunker in the chain must consume the
/// entire buffer when `must_consume_all` is true.
pub trait Chunker: Send + Sync {
    fn split(
        &mut self,
        buf: &[u8],
        must_consume_all: bool,
        emit: &mut EmitFn,
    ) -> Result<usize, ChunkerError>;

    fn constants(&self) -> InstanceConstants;
}

/// Drives a sequence of chunkers over one buffer, honoring the hand-off rule:
/// a chunker that makes no progress on the current offset yields that offset
/// to the next chunker in the chain; any chunker that *does* make progress
/// sends control back to the front of the chain so earlier (structural)
/// chunkers get first look at freshly exposed bytes.
pub struct ChunkerChain {
    stages: Vec<Box<dyn Chunker>>,
}

impl ChunkerChain {
    pub fn new(stages: Vec<Box<dyn Chunker>>) -> Result<Self, crate::error::ConfigError> {
        if stages.is_empty() {
            return Err(crate::error::ConfigError::single(
                "chunker chain must contain at least one chunker",
            ));
        }
        Ok(Self { stages })
    }

    /// The shape constants of the tail (last) chunker, which the driver uses
    /// to size region requests.
    pub fn tail_constants(&self) -> InstanceConstants {
        self.stages.last().expect("non-empty by construction").constants()
    }

    pub fn split(
        &mut self,
        buf: &[u8],
        must_consume_all: bool,
        emit: &mut EmitFn,
    ) -> Result<usize, ChunkerError> {
        let mut offset = 0;
        'progress: loop {
            if offset == buf.len() {
                return Ok(offset);
            }
            for (i, stage) in self.stages.iter_mut().enumerate() {
                let is_last = i + 1 == self.stages.len();
                let remaining = &buf[offset..];
                if remaining.is_empty() {
                    return Ok(offset);
                }
                let want_all = must_consume_all && is_last;
                let consumed = stage.split(remaining, want_all, emit)?;
                if consumed > 0 {
                    offset += consumed;
                    continue 'progress;
                }
                if is_last {
                    // the tail could not make progress either; nothing left
                    // to try this round (either insufficient data and we are
                    // not required to drain, or a genuine deadlock - in
                    // either case the driver will ask for more bytes).
                    return Ok(offset);
                }
                // this stage declined; let the next stage try the same bytes
            }
        }
    }
}
