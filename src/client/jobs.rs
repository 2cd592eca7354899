//! In-flight request registry.
//!
//! Allocates correlation ids and holds one settlement channel per pending
//! request until the matching response arrives or the transport dies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::error::BridgeError;

/// Outcome delivered to the caller awaiting a job.
pub type JobOutcome = Result<Value, BridgeError>;

#[derive(Debug)]
struct PendingJobs {
    /// Set once the transport is gone; later allocations fail fast.
    closed: Option<String>,
    jobs: HashMap<u64, oneshot::Sender<JobOutcome>>,
}

/// Tracks in-flight requests by correlation id.
///
/// Allocation and settlement interleave arbitrarily across tasks; the map
/// lives behind a tokio mutex and each job's channel is used exactly once.
/// Ids come from a monotonic counter, so an id is unique among pending
/// jobs and is never handed out twice.
#[derive(Debug)]
pub struct JobRegistry {
    next_idx: AtomicU64,
    pending: Mutex<PendingJobs>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            next_idx: AtomicU64::new(1),
            pending: Mutex::new(PendingJobs {
                closed: None,
                jobs: HashMap::new(),
            }),
        }
    }

    /// Register a new pending job, returning its id and the receiver the
    /// caller awaits.
    ///
    /// Fails fast with `TransportClosed` once
    /// [`cancel_all`](Self::cancel_all) has run.
    pub async fn allocate(&self) -> Result<(u64, oneshot::Receiver<JobOutcome>), BridgeError> {
        let mut pending = self.pending.lock().await;
        if let Some(reason) = &pending.closed {
            return Err(BridgeError::transport_closed(reason.clone()));
        }
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        pending.jobs.insert(idx, tx);
        Ok((idx, rx))
    }

    /// Resolve or reject the pending job with this id.
    ///
    /// A stale or duplicate id is ignored; the correlator must never fall
    /// over because of a response it no longer recognizes.
    pub async fn settle(&self, idx: u64, outcome: JobOutcome) {
        let tx = self.pending.lock().await.jobs.remove(&idx);
        if let Some(tx) = tx {
            // The caller may have dropped its receiver; nothing to do then.
            let _ = tx.send(outcome);
        }
    }

    /// Drop a job whose request never made it onto the wire.
    pub async fn forget(&self, idx: u64) {
        self.pending.lock().await.jobs.remove(&idx);
    }

    /// Reject every pending job with `TransportClosed` and refuse all
    /// future allocations.
    pub async fn cancel_all(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        pending.closed = Some(reason.to_string());
        for (_, tx) in pending.jobs.drain() {
            let _ = tx.send(Err(BridgeError::transport_closed(reason)));
        }
    }

    /// Whether [`cancel_all`](Self::cancel_all) has run.
    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed.is_some()
    }

    /// Number of currently pending jobs.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.jobs.len()
    }
}
