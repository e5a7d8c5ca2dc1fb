//! Waiters for commands that have been written but not yet answered
//!
//! Completion and eviction both go through `DashMap::remove`, so for any
//! request id exactly one of them wins. A response that arrives after its
//! waiter was evicted finds nothing and is dropped.

use dashmap::DashMap;
use nodeplane_proto::ResponseEnvelope;
use tokio::sync::oneshot;

/// Pending waiters of one node session, keyed by request id
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiters: DashMap<String, oneshot::Sender<ResponseEnvelope>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter and get the receiving half
    pub fn register(&self, request_id: impl Into<String>) -> oneshot::Receiver<ResponseEnvelope> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(request_id.into(), tx);
        rx
    }

    /// Hand a response to its waiter
    ///
    /// Returns false when no waiter is registered under the response's id
    /// (unknown, already answered, or evicted).
    pub fn complete(&self, response: ResponseEnvelope) -> bool {
        let Some(request_id) = response.request_id.as_deref() else {
            return false;
        };
        match self.waiters.remove(request_id) {
            // The caller may have stopped waiting between remove and send
            Some((_, tx)) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop a waiter that will never be completed
    pub fn evict(&self, request_id: &str) -> bool {
        self.waiters.remove(request_id).is_some()
    }

    /// Drop every waiter; their receivers observe a closed channel
    pub fn fail_all(&self) -> usize {
        let count = self.waiters.len();
        self.waiters.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Evicts its waiter when dropped, covering timeouts and cancelled callers
pub(crate) struct WaiterGuard<'a> {
    pending: &'a PendingRequests,
    request_id: &'a str,
}

impl<'a> WaiterGuard<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, request_id: &'a str) -> Self {
        Self {
            pending,
            request_id,
        }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.pending.evict(self.request_id);
    }
}
