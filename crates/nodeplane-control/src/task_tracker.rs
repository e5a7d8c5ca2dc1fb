//! Task tracking for per-node reader tasks
//!
//! Tracks the JoinHandle of each node's reader together with the session it
//! reads for, so a replaced session's reader can be aborted and a reader
//! that ends on its own only forgets its own entry.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;

struct Tracked {
    session_id: String,
    handle: JoinHandle<()>,
}

/// Tracks reader tasks by node id
pub struct TaskTracker {
    tasks: Mutex<HashMap<i64, Tracked>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register the reader of a session, aborting whatever ran before it
    pub fn register(&self, node_id: i64, session_id: String, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(old) = tasks.insert(node_id, Tracked { session_id, handle }) {
                old.handle.abort();
            }
        }
    }

    /// Forget a finished reader without aborting it, if it is still the tracked one
    pub fn release(&self, node_id: i64, session_id: &str) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if tasks
                .get(&node_id)
                .is_some_and(|tracked| tracked.session_id == session_id)
            {
                tasks.remove(&node_id);
            }
        }
    }

    /// Unregister and abort the reader of a node
    pub fn unregister(&self, node_id: i64) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(tracked) = tasks.remove(&node_id) {
                tracked.handle.abort();
            }
        }
    }

    /// Abort every tracked reader
    pub fn abort_all(&self) -> usize {
        match self.tasks.lock() {
            Ok(mut tasks) => {
                let count = tasks.len();
                for (_, tracked) in tasks.drain() {
                    tracked.handle.abort();
                }
                count
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}
