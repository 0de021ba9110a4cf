//! External sink interfaces: the CAR block sink, the root/pin sink, and the
//! statistics sink are all out-of-scope collaborators — this module only
//! states the interface the driver calls into, plus a no-op and an
//! in-memory implementation used by the integration tests.

use crate::error::SinkError;
use crate::rope::ByteRope;
use crate::stats::{RootRecord, StatsSummary};
use async_trait::async_trait;

/// Receives every *unique* block in DAG-construction order as
/// `{cid_bytes, serialized_bytes}`.
#[async_trait]
pub trait BlockSink: Send + Sync {
    async fn write_block(&mut self, cid: &[u8], content: &ByteRope) -> Result<(), SinkError>;
}

/// Receives, per substream, the final root record.
#[async_trait]
pub trait RootSink: Send + Sync {
    async fn write_root(&mut self, record: &RootRecord) -> Result<(), SinkError>;
}

/// Receives the end-of-run structured statistics summary.
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn write_stats(&mut self, summary: &StatsSummary) -> Result<(), SinkError>;
}

/// Discards everything; used when a run only cares about the resulting
/// root CID and not the emitted blocks (e.g. `--sink none`).
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl BlockSink for NullSink {
    async fn write_block(&mut self, _cid: &[u8], _content: &ByteRope) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl RootSink for NullSink {
    async fn write_root(&mut self, _record: &RootRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl StatsSink for NullSink {
    async fn write_stats(&mut self, _summary: &StatsSummary) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Buffers everything in memory; used by integration tests and by the
/// `streamdag` binary's `--sink stdout` mode (summaries are printed, blocks
/// are discarded after being counted).
#[derive(Debug, Default)]
pub struct InMemorySink {
    pub blocks: Vec<(Vec<u8>, Vec<u8>)>,
    pub roots: Vec<RootRecord>,
    pub stats: Vec<StatsSummary>,
}

#[async_trait]
impl BlockSink for InMemorySink {
    async fn write_block(&mut self, cid: &[u8], content: &ByteRope) -> Result<(), SinkError> {
        let bytes = content.append_to(Vec::with_capacity(content.size()));
        self.blocks.push((cid.to_vec(), bytes));
        Ok(())
    }
}

#[async_trait]
impl RootSink for InMemorySink {
    async fn write_root(&mut self, record: &RootRecord) -> Result<(), SinkError> {
        self.roots.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl StatsSink for InMemorySink {
    async fn write_stats(&mut self, summary: &StatsSummary) -> Result<(), SinkError> {
        self.stats.push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn null_sink_accepts_everything() {
        let mut sink = NullSink;
        let rope = ByteRope::from(Bytes::from_static(b"x"));
        sink.write_block(&[1, 2, 3], &rope).await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_sink_records_blocks() {
        let mut sink = InMemorySink::default();
        let rope = ByteRope::from(Bytes::from_static(b"hello"));
        sink.write_block(&[9, 9], &rope).await.unwrap();
        assert_eq!(sink.blocks.len(), 1);
        assert_eq!(sink.blocks[0].1, b"hello");
    }
}
