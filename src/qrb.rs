//! Quantized ring buffer.
//!
//! Reads from an arbitrary [`std::io::Read`] source and hands out
//! overlapping, zero-copy [`Region`]s to the chunker chain. Writes advance
//! in multiples of `sector_quantum` to cooperate with direct-I/O-style
//! alignment hints; regions are [`bytes::Bytes`] slices, so handing out an
//! overlapping lookback window never copies — only a fresh read from the
//! underlying source allocates.

use crate::error::ConfigError;
use bytes::Bytes;
use std::io::Read;
use tracing::trace;

/// Construction parameters, validated in [`Qrb::new`].
#[derive(Debug, Clone, Copy)]
pub struct QrbConfig {
    pub min_region: usize,
    pub max_region: usize,
    pub sector_quantum: usize,
    pub total_buffer_size: usize,
}

impl QrbConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = Vec::new();
        if self.min_region >= self.max_region {
            errs.push("qrb min_region must be smaller than max_region".to_string());
        }
        if self.sector_quantum == 0 {
            errs.push("qrb sector_quantum must be nonzero".to_string());
        }
        let required = 2 * self.max_region + self.sector_quantum;
        if self.total_buffer_size < required {
            errs.push(format!(
                "qrb total_buffer_size {} must be at least 2*max_region + sector_quantum ({})",
                self.total_buffer_size, required
            ));
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(errs))
        }
    }
}

/// Producer/consumer throughput counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QrbStats {
    pub read_calls: u64,
    pub bytes_read: u64,
    /// Incremented whenever a refill had to allocate fresh backing storage
    /// while a previously issued region was still outstanding (unreleased).
    pub collisions: u64,
}

/// A borrowed, read-only view into the ring buffer.
#[derive(Debug, Clone)]
pub struct Region {
    data: Bytes,
}

impl Region {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A zero-copy, refcounted clone of the region's bytes, suitable for
    /// handing to the encoder as leaf content.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }
}

pub struct Qrb<R> {
    reader: R,
    cfg: QrbConfig,
    current: Bytes,
    eof: bool,
    outstanding: usize,
    stats: QrbStats,
}

impl<R: Read> Qrb<R> {
    pub fn new(reader: R, cfg: QrbConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            reader,
            cfg,
            current: Bytes::new(),
            eof: false,
            outstanding: 0,
            stats: QrbStats::default(),
        })
    }

    pub fn stats(&self) -> QrbStats {
        self.stats
    }

    /// Returns the longest contiguous unread view up to `max` bytes, not
    /// shorter than `min` unless EOF is reached, or `None` once the stream
    /// is fully drained. `min`/`max` must not exceed the buffer's own
    /// region bounds; callers (the chunker chain) are expected to request
    /// within `[min_region, max_region]`.
    pub fn next_region(
        &mut self,
        min: usize,
        max: usize,
    ) -> Result<Option<Region>, std::io::Error> {
        crate::sanity_check!(
            min <= self.cfg.max_region && max <= self.cfg.max_region,
            "qrb region request exceeds configured max_region"
        );

        while self.current.len() < min && !self.eof {
            self.fill()?;
        }

        let take = self.current.len().min(max);
        if take == 0 {
            return Ok(None);
        }

        self.outstanding += 1;
        Ok(Some(Region {
            data: self.current.slice(0..take),
        }))
    }

    /// Releases `region`, advancing the read cursor past `consumed` bytes
    /// of it. `consumed` may be less than `region.len()` when the chunker
    /// chain only processed a prefix and wants the rest re-offered.
    pub fn release(&mut self, region: Region, consumed: usize) {
        crate::sanity_check!(
            consumed <= region.len(),
            "released more bytes than the region contained"
        );
        self.outstanding = self.outstanding.saturating_sub(1);
        self.current = self.current.slice(consumed..);
    }

    pub fn at_eof(&self) -> bool {
        self.eof && self.current.is_empty()
    }

    /// True once the underlying reader has signaled its own EOF, regardless
    /// of how many buffered bytes are still waiting to be handed out as
    /// regions. Unlike [`Qrb::at_eof`] (which only fires after the buffer is
    /// fully drained too), this is what a caller needs to know whether the
    /// *next* region it requests is the final one and must be consumed in
    /// full by the chunker chain.
    pub fn reader_exhausted(&self) -> bool {
        self.eof
    }

    /// Bytes currently buffered and not yet handed out past their `consumed`
    /// prefix. A region returned by `next_region` is the *last* one for this
    /// reader iff `reader_exhausted()` is true and the region's length equals
    /// this count: nothing would be left to fill a further region with.
    pub fn buffered_len(&self) -> usize {
        self.current.len()
    }

    fn fill(&mut self) -> Result<(), std::io::Error> {
        let already = self.current.len();
        let room = self.cfg.total_buffer_size.saturating_sub(already);
        let want = room.max(self.cfg.sector_quantum);
        // round down to a sector multiple, but always read at least one
        // sector's worth so forward progress is guaranteed.
        let want = (want / self.cfg.sector_quantum).max(1) * self.cfg.sector_quantum;

        let mut fresh = vec![0u8; want];
        let mut got = 0;
        while got < want {
            let n = self.reader.read(&mut fresh[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }

        self.stats.read_calls += 1;
        self.stats.bytes_read += got as u64;

        if self.outstanding > 0 {
            self.stats.collisions += 1;
        }

        if got == 0 {
            self.eof = true;
            return Ok(());
        }
        fresh.truncate(got);

        let mut merged = Vec::with_capacity(already + got);
        merged.extend_from_slice(&self.current);
        merged.extend_from_slice(&fresh);
        self.current = Bytes::from(merged);

        trace!(bytes_read = got, total_buffered = self.current.len(), "qrb fill");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cfg(min: usize, max: usize, sector: usize) -> QrbConfig {
        QrbConfig {
            min_region: min,
            max_region: max,
            sector_quantum: sector,
            total_buffer_size: 2 * max + sector,
        }
    }

    #[test]
    fn reads_entire_stream_across_regions() {
        let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        let mut qrb = Qrb::new(Cursor::new(data.clone()), cfg(64, 256, 32)).unwrap();

        let mut collected = Vec::new();
        loop {
            match qrb.next_region(1, 256).unwrap() {
                None => break,
                Some(region) => {
                    let take = region.len();
                    collected.extend_from_slice(region.as_slice());
                    qrb.release(region, take);
                }
            }
        }
        assert_eq!(collected, data);
        assert!(qrb.at_eof());
    }

    #[test]
    fn overlapping_lookback_regions_share_bytes() {
        let data = b"abcdefghijklmnopqrstuvwxyz".to_vec();
        let mut qrb = Qrb::new(Cursor::new(data), cfg(4, 16, 8)).unwrap();

        let first = qrb.next_region(4, 16).unwrap().unwrap();
        let second = qrb.next_region(4, 16).unwrap().unwrap();
        // second overlaps first entirely since nothing was released yet
        assert_eq!(first.as_slice(), second.as_slice());
        qrb.release(second, 10);
        qrb.release(first, 0);
    }

    #[test]
    fn short_final_region_allowed_at_eof() {
        let mut qrb = Qrb::new(Cursor::new(b"abc".to_vec()), cfg(4, 16, 8)).unwrap();
        let region = qrb.next_region(4, 16).unwrap().unwrap();
        assert_eq!(region.as_slice(), b"abc");
    }

    #[test]
    fn rejects_undersized_total_buffer() {
        let bad = QrbConfig {
            min_region: 4,
            max_region: 16,
            sector_quantum: 8,
            total_buffer_size: 4,
        };
        assert!(bad.validate().is_err());
    }
}
