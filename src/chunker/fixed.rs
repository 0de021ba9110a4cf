//! Fixed-size chunker: emits `size`-byte chunks until fewer than `size`
//! bytes remain.

use super::{ChunkEvent, Chunker, EmitFn, InstanceConstants};
use crate::error::{ChunkerError, ConfigError};

#[derive(Debug, Clone, Copy)]
pub struct FixedChunker {
    size: usize,
}

impl FixedChunker {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::single("fixed-size chunker: size must be nonzero"));
        }
        Ok(Self { size })
    }
}

impl Chunker for FixedChunker {
    fn split(
        &mut self,
        buf: &[u8],
        must_consume_all: bool,
        emit: &mut EmitFn,
    ) -> Result<usize, ChunkerError> {
        let mut offset = 0;
        while offset + self.size <= buf.len() {
            emit(ChunkEvent { size: self.size, meta: None })?;
            offset += self.size;
        }
        if must_consume_all && offset < buf.len() {
            emit(ChunkEvent { size: buf.len() - offset, meta: None })?;
            offset = buf.len();
        }
        Ok(offset)
    }

    fn constants(&self) -> InstanceConstants {
        InstanceConstants { min_chunk_size: self.size, max_chunk_size: self.size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_full_chunks_only_without_must_consume_all() {
        let mut c = FixedChunker::new(3).unwrap();
        let mut sizes = Vec::new();
        let consumed = c
            .split(b"abcdefgh", false, &mut |ev| {
                sizes.push(ev.size);
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![3, 3]);
        assert_eq!(consumed, 6);
    }

    #[test]
    fn emits_tail_when_must_consume_all() {
        let mut c = FixedChunker::new(3).unwrap();
        let mut sizes = Vec::new();
        let consumed = c
            .split(b"abcdefgh", true, &mut |ev| {
                sizes.push(ev.size);
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![3, 3, 2]);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn rejects_zero_size() {
        assert!(FixedChunker::new(0).is_err());
    }
}
