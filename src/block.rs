//! The immutable block header record.

use crate::rope::ByteRope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;

/// A leaf's raw material before it has been framed into a block: the
/// payload bytes plus chunker-attached metadata (e.g. the shrubber's
/// `padding-cluster-atom-hex` tag).
#[derive(Debug, Clone, Default)]
pub struct DataSource {
    pub content: ByteRope,
    pub size: usize,
    pub meta: HashMap<String, String>,
}

/// One-shot completion signal for a header's CID.
///
/// `Ready` is a pre-fired sentinel used whenever the CID is known
/// synchronously (identity inlining, dummy hashing, synchronous hashing),
/// avoiding a `Notify` allocation for the overwhelmingly common case.
#[derive(Debug, Clone)]
enum CidSignal {
    Ready,
    Pending {
        fired: Arc<AtomicBool>,
        notify: Arc<Notify>,
    },
}

impl CidSignal {
    fn pending() -> Self {
        CidSignal::Pending {
            fired: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Fires the signal. Must be called exactly once for a `Pending` signal.
    fn fire(&self) {
        if let CidSignal::Pending { fired, notify } = self {
            fired.store(true, Ordering::Release);
            notify.notify_waiters();
        }
    }

    async fn wait(&self) {
        let (fired, notify) = match self {
            CidSignal::Ready => return,
            CidSignal::Pending { fired, notify } => (fired, notify),
        };
        loop {
            if fired.load(Ordering::Acquire) {
                return;
            }
            let notified = notify.notified();
            if fired.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// An immutable DAG block: either a leaf (raw payload) or a link node
/// (references to children), addressed by its CID.
#[derive(Debug)]
pub struct Header {
    content: RwLock<Option<ByteRope>>,
    cid: Mutex<Vec<u8>>,
    cid_ready: CidSignal,
    size_block: usize,
    size_cumulative_payload: u64,
    size_cumulative_dag: u64,
    is_cid_inlined: bool,
    dummy_hashed: bool,
    content_gone: AtomicBool,
}

impl Header {
    /// Constructs a header whose CID is already known (identity inlining,
    /// dummy hashing, or synchronous hashing).
    pub fn with_ready_cid(
        content: ByteRope,
        cid: Vec<u8>,
        size_cumulative_payload: u64,
        size_cumulative_dag: u64,
        is_cid_inlined: bool,
        dummy_hashed: bool,
    ) -> Self {
        let size_block = content.size();
        Self {
            content: RwLock::new(Some(content)),
            cid: Mutex::new(cid),
            cid_ready: CidSignal::Ready,
            size_block,
            size_cumulative_payload,
            size_cumulative_dag,
            is_cid_inlined,
            dummy_hashed,
            content_gone: AtomicBool::new(false),
        }
    }

    /// Constructs a header whose CID will be filled in later by a hasher
    /// worker; returns the header plus the setter the worker uses to
    /// complete it.
    pub fn with_pending_cid(
        content: ByteRope,
        size_cumulative_payload: u64,
        size_cumulative_dag: u64,
    ) -> (Self, PendingCidSetter) {
        let size_block = content.size();
        let signal = CidSignal::pending();
        let header = Self {
            content: RwLock::new(Some(content)),
            cid: Mutex::new(Vec::new()),
            cid_ready: signal.clone(),
            size_block,
            size_cumulative_payload,
            size_cumulative_dag,
            is_cid_inlined: false,
            dummy_hashed: false,
            content_gone: AtomicBool::new(false),
        };
        (header, PendingCidSetter { signal })
    }

    /// Blocks (asynchronously) until the CID is ready, then returns a copy
    /// of it. Cheap to call repeatedly once ready.
    pub async fn cid(&self) -> Vec<u8> {
        self.cid_ready.wait().await;
        let cid = self.cid.lock().unwrap();
        crate::sanity_check!(
            self.dummy_hashed || (cid[0] == 1 && cid.len() >= 4),
            "block header has a seemingly invalid CID"
        );
        cid.clone()
    }

    /// Accesses the block's serialized content. Panics (sanity violation)
    /// in debug builds if the content has already been evicted.
    pub fn with_content<R>(&self, f: impl FnOnce(&ByteRope) -> R) -> R {
        let guard = self.content.read().unwrap();
        crate::sanity_check!(
            !self.content_gone.load(Ordering::Acquire),
            "block content no longer available"
        );
        let rope = guard.as_ref().expect("content evicted without clearing content_gone");
        f(rope)
    }

    /// Releases the content rope once every consumer (hasher, CAR sink,
    /// statistics pass) has finished with it.
    pub fn evict_content(&self) {
        self.content_gone.store(true, Ordering::Release);
        *self.content.write().unwrap() = None;
    }

    pub fn size_block(&self) -> usize {
        self.size_block
    }

    pub fn size_cumulative_payload(&self) -> u64 {
        self.size_cumulative_payload
    }

    pub fn size_cumulative_dag(&self) -> u64 {
        self.size_cumulative_dag
    }

    pub fn is_cid_inlined(&self) -> bool {
        self.is_cid_inlined
    }

    pub fn dummy_hashed(&self) -> bool {
        self.dummy_hashed
    }
}

/// Handle a hasher worker uses to complete a header's CID exactly once.
pub struct PendingCidSetter {
    signal: CidSignal,
}

impl PendingCidSetter {
    /// Completes the CID and fires the header's ready signal. The `Header`
    /// passed in must be the same one this setter was created alongside
    /// (via [`Header::with_pending_cid`]), so the worker and the header
    /// agree on the same `Mutex<Vec<u8>>`.
    pub fn complete(self, header: &Header, cid: Vec<u8>) {
        *header.cid.lock().unwrap() = cid;
        self.signal.fire();
    }
}
