//! Zero-copy append-only byte container.
//!
//! A [`ByteRope`] never copies the bytes handed to it: each `append_*` call
//! stores a cheaply-clonable [`Bytes`] reference. Callers must guarantee the
//! underlying allocation stays alive for as long as the rope (or any clone
//! of it) is in use; `Bytes` itself is reference-counted so in practice this
//! just means "don't forget a clone somewhere that outlives its buffer".

use bytes::Bytes;
use std::io::{self, Write};

/// An ordered sequence of immutable byte slices.
#[derive(Debug, Clone, Default)]
pub struct ByteRope {
    segments: Vec<Bytes>,
    size: usize,
}

impl ByteRope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total size in bytes across all segments.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Appends a slice of bytes without copying (the `Bytes` refcount is
    /// bumped, not the data).
    pub fn append_bytes(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.size += bytes.len();
        self.segments.push(bytes);
    }

    /// Appends a single byte. Unlike `append_bytes` this does allocate a
    /// one-byte `Bytes`; used only for small framing bytes (varint tags,
    /// CBOR headers) where the cost is immaterial.
    pub fn append_byte(&mut self, b: u8) {
        self.append_bytes(Bytes::copy_from_slice(&[b]));
    }

    /// Appends another rope's segments in order, still without copying.
    pub fn append_rope(&mut self, other: &ByteRope) {
        self.size += other.size;
        self.segments.extend(other.segments.iter().cloned());
    }

    /// Copies every segment's bytes into `target`, returning it back to the
    /// caller. This is the one place the rope's "no copy" discipline is
    /// deliberately broken, to hand a contiguous buffer to non-streaming
    /// consumers (e.g. a hasher that wants `&[u8]`, or identity-CID inlining).
    pub fn append_to(&self, mut target: Vec<u8>) -> Vec<u8> {
        let before_cap = target.capacity();
        target.reserve(self.size);
        for seg in &self.segments {
            target.extend_from_slice(seg);
        }
        crate::sanity_check!(
            target.capacity() >= before_cap,
            "rope::append_to target buffer shrank its capacity, impossible"
        );
        target
    }

    /// Streams every segment to `sink` without building an intermediate
    /// contiguous buffer.
    pub fn write_to<W: Write>(&self, mut sink: W) -> io::Result<()> {
        for seg in &self.segments {
            sink.write_all(seg)?;
        }
        Ok(())
    }

    /// Returns an iterator over the underlying segments, for callers (e.g.
    /// the hasher pool) that want to feed a streaming digest without
    /// allocating a contiguous copy.
    pub fn segments(&self) -> impl Iterator<Item = &Bytes> {
        self.segments.iter()
    }
}

impl From<Bytes> for ByteRope {
    fn from(bytes: Bytes) -> Self {
        let mut rope = ByteRope::new();
        rope.append_bytes(bytes);
        rope
    }
}

impl From<Vec<u8>> for ByteRope {
    fn from(bytes: Vec<u8>) -> Self {
        ByteRope::from(Bytes::from(bytes))
    }
}
