//! Error types for dispatch and reconciliation

use nodeplane_proto::CommandKind;
use std::time::Duration;
use thiserror::Error;

/// Why a single dispatched command did not produce an OK response
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("node {0} is offline")]
    NodeOffline(i64),

    #[error("node {node_id} did not answer {command} within {timeout:?}")]
    Timeout {
        node_id: i64,
        command: CommandKind,
        timeout: Duration,
    },

    #[error("invalid dispatch timeout {0:?}")]
    InvalidTimeout(Duration),

    #[error("node {node_id} already has {limit} commands in flight")]
    Overloaded { node_id: i64, limit: usize },

    #[error("node channel closed")]
    ChannelClosed,

    #[error("agent error: {0}")]
    Agent(String),

    #[error("failed to encode command: {0}")]
    Encode(String),
}

/// Errors that abort an operation before anything is committed
///
/// The `Display` output is the message surfaced to callers.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl ControlError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ControlError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ControlError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ControlError::NotFound(msg.into())
    }
}

pub type ControlResult<T> = Result<T, ControlError>;

/// What happened when a committed change was pushed to its node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The agent acknowledged the command(s)
    Applied,
    /// Nothing needed to be sent
    Skipped,
    /// The change is stored but the agent did not take it
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SyncOutcome::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

/// A committed record together with the outcome of propagating it
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub value: T,
    pub sync: SyncOutcome,
}

impl<T> Applied<T> {
    pub fn new(value: T, sync: SyncOutcome) -> Self {
        Self { value, sync }
    }
}
