//! Connection registry: which nodes currently have a live channel
//!
//! One session per node. Registering a node that already has a session
//! replaces it and hands the old one back so the caller can close it.

use dashmap::DashMap;
use nodeplane_transport::NodeChannel;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::pending_requests::PendingRequests;

/// A live channel to one node plus its correlation state
#[derive(Debug)]
pub struct NodeSession {
    node_id: i64,
    session_id: String,
    channel: Arc<dyn NodeChannel>,
    pending: PendingRequests,
    in_flight: Arc<Semaphore>,
    max_in_flight: usize,
}

impl NodeSession {
    pub fn new(node_id: i64, channel: Arc<dyn NodeChannel>, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            node_id,
            session_id: channel.channel_id(),
            channel,
            pending: PendingRequests::new(),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    /// Identity of the underlying channel, distinct across reconnects
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn channel(&self) -> &Arc<dyn NodeChannel> {
        &self.channel
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn in_flight(&self) -> &Arc<Semaphore> {
        &self.in_flight
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}

/// Node id to live session
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<DashMap<i64, Arc<NodeSession>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning the one it replaced
    pub fn register(&self, session: Arc<NodeSession>) -> Option<Arc<NodeSession>> {
        let node_id = session.node_id();
        let session_id = session.session_id().to_string();
        let replaced = self.sessions.insert(node_id, session);

        match &replaced {
            Some(old) => info!(
                node_id,
                session_id = %session_id,
                old_session_id = %old.session_id(),
                "Replaced node session"
            ),
            None => info!(node_id, session_id = %session_id, "Registered node session"),
        }
        replaced
    }

    /// Remove whatever session the node has
    pub fn unregister(&self, node_id: i64) -> Option<Arc<NodeSession>> {
        let removed = self.sessions.remove(&node_id).map(|(_, session)| session);
        if removed.is_some() {
            info!(node_id, "Unregistered node session");
        }
        removed
    }

    /// Remove the node's session only if it is still `session_id`
    pub fn unregister_if_current(&self, node_id: i64, session_id: &str) -> bool {
        let removed = self
            .sessions
            .remove_if(&node_id, |_, current| current.session_id() == session_id)
            .is_some();
        if !removed {
            debug!(node_id, session_id, "Session already replaced; keeping current");
        }
        removed
    }

    pub fn lookup(&self, node_id: i64) -> Option<Arc<NodeSession>> {
        self.sessions.get(&node_id).map(|entry| entry.value().clone())
    }

    pub fn is_connected(&self, node_id: i64) -> bool {
        self.sessions.contains_key(&node_id)
    }

    /// Ids of every connected node, ascending
    pub fn connected_nodes(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Remove and return every session
    pub fn drain(&self) -> Vec<Arc<NodeSession>> {
        let ids: Vec<i64> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.sessions.remove(&id).map(|(_, session)| session))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
