//! Channel abstraction between the control plane and node agents
//!
//! A transport hands the control plane one bidirectional channel per
//! connected node, already bound to that node's identity. The channel is
//! split in two halves:
//!
//! - [`NodeChannel`]: the write half. Shared behind an `Arc`, written to
//!   concurrently by any number of dispatch callers. Each call writes one
//!   whole frame; frames never interleave.
//! - [`ChannelSource`]: the read half. Owned by exactly one reader task.

pub mod memory;

pub use memory::{memory_channel, MemoryChannel, MemoryPeer, MemorySource};

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Send error: {0}")]
    SendError(String),

    #[error("Receive error: {0}")]
    RecvError(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Write half of a node channel
#[async_trait]
pub trait NodeChannel: Send + Sync + Debug {
    /// Write one complete text frame to the node
    async fn send_frame(&self, frame: String) -> TransportResult<()>;

    /// Close the channel; later sends fail with [`TransportError::ChannelClosed`]
    async fn close(&self, reason: &str);

    fn is_closed(&self) -> bool;

    /// Unique id of this physical channel, used to tell sessions apart
    fn channel_id(&self) -> String;
}

/// Read half of a node channel
#[async_trait]
pub trait ChannelSource: Send {
    /// Next frame from the node, `Ok(None)` once the peer has gone away
    async fn recv_frame(&mut self) -> TransportResult<Option<String>>;
}
