//! Correlated command dispatch over node channels
//!
//! Every dispatch gets a fresh request id, a waiter in the node's pending
//! table, and one frame on the node's channel. A single reader task per
//! node drains the channel and completes waiters by request id. Callers
//! block only themselves, for at most the deadline they asked for.

use nodeplane_proto::{Command, CommandEnvelope, CommandKind, ResponseEnvelope, STATUS_OK};
use nodeplane_transport::{ChannelSource, NodeChannel};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::pending_requests::WaiterGuard;
use crate::registry::{ConnectionRegistry, NodeSession};
use crate::task_tracker::TaskTracker;

/// Process-wide dispatcher, constructed at startup and shut down on exit
pub struct Dispatcher {
    registry: ConnectionRegistry,
    tasks: Arc<TaskTracker>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            tasks: Arc::new(TaskTracker::new()),
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn is_connected(&self, node_id: i64) -> bool {
        self.registry.is_connected(node_id)
    }

    pub fn connected_nodes(&self) -> Vec<i64> {
        self.registry.connected_nodes()
    }

    /// Bind a node's channel and start its reader
    ///
    /// A session the node already had is closed; its reader is aborted and
    /// its outstanding waiters resolve with [`DispatchError::ChannelClosed`].
    pub async fn attach<C, S>(&self, node_id: i64, channel: C, source: S)
    where
        C: NodeChannel + 'static,
        S: ChannelSource + 'static,
    {
        let session = Arc::new(NodeSession::new(
            node_id,
            Arc::new(channel),
            self.config.max_in_flight,
        ));
        let session_id = session.session_id().to_string();

        if let Some(old) = self.registry.register(session.clone()) {
            old.pending().fail_all();
            old.channel().close("replaced by a new session").await;
        }

        let handle = tokio::spawn(read_loop(
            session,
            source,
            self.registry.clone(),
            self.tasks.clone(),
        ));
        self.tasks.register(node_id, session_id, handle);
    }

    /// Drop a node's session, closing its channel
    pub async fn detach(&self, node_id: i64) -> bool {
        self.tasks.unregister(node_id);
        match self.registry.unregister(node_id) {
            Some(session) => {
                session.pending().fail_all();
                session.channel().close("detached").await;
                true
            }
            None => false,
        }
    }

    /// Send one command and wait for its response
    ///
    /// Returns the response's data on OK. Fails fast with
    /// [`DispatchError::NodeOffline`] when the node has no channel.
    pub async fn dispatch(
        &self,
        node_id: i64,
        kind: CommandKind,
        payload: Value,
        timeout: Duration,
    ) -> Result<Option<Value>, DispatchError> {
        if timeout.is_zero() || timeout > self.config.max_timeout {
            return Err(DispatchError::InvalidTimeout(timeout));
        }

        let session = self
            .registry
            .lookup(node_id)
            .ok_or(DispatchError::NodeOffline(node_id))?;

        let _permit = session
            .in_flight()
            .clone()
            .try_acquire_owned()
            .map_err(|_| DispatchError::Overloaded {
                node_id,
                limit: session.max_in_flight(),
            })?;

        // One deadline covers both the write and the wait for the answer
        let deadline = Instant::now() + timeout;
        let timed_out = || DispatchError::Timeout {
            node_id,
            command: kind,
            timeout,
        };

        let request_id = Uuid::new_v4().to_string();
        let frame = CommandEnvelope::new(request_id.clone(), kind, payload)
            .to_frame()
            .map_err(|e| DispatchError::Encode(e.to_string()))?;

        let rx = session.pending().register(request_id.clone());
        let _guard = WaiterGuard::new(session.pending(), &request_id);

        debug!(node_id, request_id = %request_id, command = %kind, "Dispatching command");

        match timeout_at(deadline, session.channel().send_frame(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(node_id, command = %kind, error = %e, "Failed to write command frame");
                return Err(DispatchError::ChannelClosed);
            }
            Err(_elapsed) => {
                warn!(node_id, command = %kind, "Command frame write did not complete before deadline");
                return Err(timed_out());
            }
        }

        match timeout_at(deadline, rx).await {
            Ok(Ok(response)) => into_result(response),
            Ok(Err(_closed)) => Err(DispatchError::ChannelClosed),
            Err(_elapsed) => Err(timed_out()),
        }
    }

    /// Dispatch a typed command with the default deadline
    pub async fn send(
        &self,
        node_id: i64,
        command: &Command,
    ) -> Result<Option<Value>, DispatchError> {
        let payload = command
            .payload()
            .map_err(|e| DispatchError::Encode(e.to_string()))?;
        self.dispatch(node_id, command.kind(), payload, self.config.default_timeout)
            .await
    }

    /// Abort every reader and close every channel
    pub async fn shutdown(&self) {
        let aborted = self.tasks.abort_all();
        let sessions = self.registry.drain();
        let count = sessions.len();
        for session in sessions {
            session.pending().fail_all();
            session.channel().close("control plane shutting down").await;
        }
        info!(sessions = count, readers = aborted, "Dispatcher shut down");
    }
}

fn into_result(response: ResponseEnvelope) -> Result<Option<Value>, DispatchError> {
    if response.status.is_ok() {
        Ok(response.data)
    } else {
        Err(DispatchError::Agent(response.status.message().to_string()))
    }
}

/// Single reader of one node session
async fn read_loop<S: ChannelSource>(
    session: Arc<NodeSession>,
    mut source: S,
    registry: ConnectionRegistry,
    tasks: Arc<TaskTracker>,
) {
    let node_id = session.node_id();
    info!(node_id, session_id = %session.session_id(), "Node session attached");

    loop {
        match source.recv_frame().await {
            Ok(Some(frame)) => handle_frame(&session, &frame),
            Ok(None) => {
                info!(node_id, "Node channel closed by peer");
                break;
            }
            Err(e) => {
                warn!(node_id, error = %e, "Node channel read failed");
                break;
            }
        }
    }

    let failed = session.pending().fail_all();
    if failed > 0 {
        debug!(node_id, failed, "Failed outstanding waiters");
    }
    session.channel().close("reader ended").await;

    if registry.unregister_if_current(node_id, session.session_id()) {
        tasks.release(node_id, session.session_id());
        info!(node_id, "Node session detached");
    }
}

fn handle_frame(session: &NodeSession, frame: &str) {
    let node_id = session.node_id();
    let response = match ResponseEnvelope::from_frame(frame) {
        Ok(response) => response,
        Err(e) => {
            warn!(node_id, error = %e, "Dropping malformed frame");
            return;
        }
    };

    let Some(request_id) = response.request_id.clone().filter(|id| !id.is_empty()) else {
        debug!(node_id, "Dropping unsolicited frame");
        return;
    };

    let status_ok = response.status.is_ok();
    if session.pending().complete(response) {
        debug!(
            node_id,
            request_id = %request_id,
            status = if status_ok { STATUS_OK } else { "error" },
            "Completed command"
        );
    } else {
        debug!(node_id, request_id = %request_id, "Dropping response with no waiter");
    }
}
