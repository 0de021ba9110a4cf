//! Detects runs of a single repeated byte ("padding atoms") at the front of
//! the buffer and emits them as their own chunks, tagged so the shrubber
//! collector can recognize and compact them. Declines (returns 0 consumed)
//! when the buffer doesn't open with a qualifying run, handing the bytes to
//! the next chunker in the chain.

use super::{ChunkEvent, Chunker, EmitFn, InstanceConstants};
use crate::error::{ChunkerError, ConfigError};

#[derive(Debug, Clone)]
pub struct PadfinderConfig {
    /// Minimum length of a same-byte run before it is recognized as padding.
    pub min_run: usize,
    /// A single emitted padding chunk is capped at this size so very long
    /// runs still decompose into reusable same-size atoms for the shrubber.
    pub max_chunk: usize,
}

impl Default for PadfinderConfig {
    fn default() -> Self {
        Self { min_run: 4096, max_chunk: 262_144 }
    }
}

impl PadfinderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();
        if self.min_run == 0 {
            errs.push("padfinder min_run must be nonzero".to_string());
        }
        if self.max_chunk < self.min_run {
            errs.push("padfinder max_chunk must be at least min_run".to_string());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(errs))
        }
    }
}

pub struct PadfinderChunker {
    cfg: PadfinderConfig,
}

impl PadfinderChunker {
    pub fn new(cfg: PadfinderConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    fn run_length(buf: &[u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let atom = buf[0];
        buf.iter().take_while(|&&b| b == atom).count()
    }
}

impl Chunker for PadfinderChunker {
    fn split(
        &mut self,
        buf: &[u8],
        must_consume_all: bool,
        emit: &mut EmitFn,
    ) -> Result<usize, ChunkerError> {
        let run = Self::run_length(buf);
        if run == 0 || run < self.cfg.min_run {
            return Ok(0);
        }
        // a run that reaches the end of the buffer might still be growing;
        // cede it to a future call once more bytes are available, unless we
        // are required to drain the buffer now.
        if run == buf.len() && !must_consume_all {
            return Ok(0);
        }

        let atom = buf[0];
        let atom_hex = hex::encode([atom]);
        let mut consumed = 0;
        while consumed < run {
            let take = (run - consumed).min(self.cfg.max_chunk);
            emit(ChunkEvent {
                size: take,
                meta: Some(("padding-cluster-atom-hex".to_string(), atom_hex.clone())),
            })?;
            consumed += take;
        }
        Ok(consumed)
    }

    fn constants(&self) -> InstanceConstants {
        InstanceConstants { min_chunk_size: self.cfg.min_run, max_chunk_size: self.cfg.max_chunk }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_leading_pad_run() {
        let mut c = PadfinderChunker::new(PadfinderConfig { min_run: 8, max_chunk: 4096 }).unwrap();
        let mut data = vec![0u8; 100];
        data.extend_from_slice(b"tail-data-not-padding");
        let mut events = Vec::new();
        let consumed = c
            .split(&data, false, &mut |ev| {
                events.push(ev);
                Ok(())
            })
            .unwrap();
        assert_eq!(consumed, 100);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].meta.as_ref().unwrap().1, hex::encode([0u8]));
    }

    #[test]
    fn declines_non_padding_prefix() {
        let mut c = PadfinderChunker::new(PadfinderConfig::default()).unwrap();
        let consumed = c.split(b"not-padding-at-all", false, &mut |_| Ok(())).unwrap();
        assert_eq!(consumed, 0);
    }

    #[test]
    fn large_run_splits_into_max_chunk_pieces() {
        let mut c = PadfinderChunker::new(PadfinderConfig { min_run: 8, max_chunk: 16 }).unwrap();
        let data = vec![7u8; 50];
        let mut events = Vec::new();
        let consumed = c
            .split(&data, true, &mut |ev| {
                events.push(ev.size);
                Ok(())
            })
            .unwrap();
        assert_eq!(consumed, 50);
        assert_eq!(events, vec![16, 16, 16, 2]);
    }
}
