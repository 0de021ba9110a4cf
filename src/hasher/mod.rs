//! Fixed-size asynchronous hasher pool.
//!
//! Workers consume `HashTask`s off a bounded MPMC channel with no ordering
//! guarantees; each header's own [`crate::block::PendingCidSetter`] is what
//! serializes its readers.

use crate::block::{Header, PendingCidSetter};
use crate::cid::HashAlgorithm;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// One unit of work: hash `header`'s content and complete its CID.
pub struct HashTask {
    pub header: Arc<Header>,
    pub setter: PendingCidSetter,
    pub algorithm: HashAlgorithm,
    pub digest_len: usize,
    /// `[0x01, codec, mh_id, digest_len]`, precomputed by the encoder.
    pub cid_prefix: Vec<u8>,
}

/// A fixed-size pool of hashing workers, or a disabled (synchronous) pool
/// when constructed with zero workers.
pub struct HasherPool {
    sender: Option<mpsc::Sender<HashTask>>,
    workers: Vec<JoinHandle<()>>,
    live_workers: Arc<AtomicUsize>,
}

impl HasherPool {
    /// `worker_count == 0` disables the pool entirely; callers must hash
    /// synchronously in that case.
    pub fn new(worker_count: usize) -> Self {
        if worker_count == 0 {
            return Self {
                sender: None,
                workers: Vec::new(),
                live_workers: Arc::new(AtomicUsize::new(0)),
            };
        }

        // Queue up to 8x the worker count, mirroring the reference pool.
        let (tx, rx) = mpsc::channel::<HashTask>(8 * worker_count);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let live_workers = Arc::new(AtomicUsize::new(worker_count));

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let rx = rx.clone();
            let live_workers = live_workers.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(task) = task else { break };
                    trace!(worker = id, "hasher worker processing task");
                    let digest = task
                        .header
                        .with_content(|rope| task.algorithm.digest(rope, task.digest_len));
                    let mut cid = task.cid_prefix;
                    cid.extend_from_slice(&digest);
                    task.setter.complete(&task.header, cid);
                }
                live_workers.fetch_sub(1, Ordering::AcqRel);
                debug!(worker = id, "hasher worker exiting");
            }));
        }

        Self {
            sender: Some(tx),
            workers,
            live_workers,
        }
    }

    pub fn is_async(&self) -> bool {
        self.sender.is_some()
    }

    /// Configured worker count (`0` for a disabled/synchronous pool), used by
    /// the pipeline driver to report resource usage in the statistics summary.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues a task. Only valid when [`HasherPool::is_async`] is true.
    pub async fn enqueue(&self, task: HashTask) {
        self.sender
            .as_ref()
            .expect("enqueue called on a synchronous (zero-worker) pool")
            .send(task)
            .await
            .expect("hasher pool receiver dropped before shutdown");
    }

    /// Closes the queue and waits for every worker to drain and exit,
    /// confirming (in sanity builds) that none are left running.
    pub async fn shutdown(mut self) {
        self.sender.take();
        for w in self.workers.drain(..) {
            w.await.expect("hasher worker panicked");
        }
        crate::sanity_check!(
            self.live_workers.load(Ordering::Acquire) == 0,
            "hasher pool shutdown with workers still marked live"
        );
    }
}
