//! In-process channel pair
//!
//! Backs embedded agents and tests: the control plane gets the usual
//! [`NodeChannel`]/[`ChannelSource`] halves, the other end gets a
//! [`MemoryPeer`] that reads commands and writes responses.

use async_trait::async_trait;
use nodeplane_proto::{CommandEnvelope, ResponseEnvelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{ChannelSource, NodeChannel, TransportError, TransportResult};

/// Create a connected channel pair with `buffer` frames of slack per direction
pub fn memory_channel(buffer: usize) -> (MemoryChannel, MemorySource, MemoryPeer) {
    let (to_peer_tx, to_peer_rx) = mpsc::channel(buffer);
    let (from_peer_tx, from_peer_rx) = mpsc::channel(buffer);

    let channel = MemoryChannel {
        channel_id: format!("mem-{}", uuid::Uuid::new_v4()),
        tx: to_peer_tx,
        closed: Arc::new(AtomicBool::new(false)),
    };
    let source = MemorySource { rx: from_peer_rx };
    let peer = MemoryPeer {
        rx: to_peer_rx,
        tx: from_peer_tx,
    };

    (channel, source, peer)
}

#[derive(Debug)]
pub struct MemoryChannel {
    channel_id: String,
    tx: mpsc::Sender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl NodeChannel for MemoryChannel {
    async fn send_frame(&self, frame: String) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn close(&self, _reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn channel_id(&self) -> String {
        self.channel_id.clone()
    }
}

pub struct MemorySource {
    rx: mpsc::Receiver<String>,
}

#[async_trait]
impl ChannelSource for MemorySource {
    async fn recv_frame(&mut self) -> TransportResult<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

/// The agent end of a memory channel
pub struct MemoryPeer {
    rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<String>,
}

impl MemoryPeer {
    /// Next raw frame written by the control plane
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next command, skipping frames that do not decode as commands
    pub async fn recv_command(&mut self) -> Option<CommandEnvelope> {
        while let Some(frame) = self.rx.recv().await {
            if let Ok(command) = CommandEnvelope::from_frame(&frame) {
                return Some(command);
            }
        }
        None
    }

    pub async fn send_frame(&self, frame: impl Into<String>) -> TransportResult<()> {
        self.tx
            .send(frame.into())
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    pub async fn respond(&self, response: &ResponseEnvelope) -> TransportResult<()> {
        let frame = response
            .to_frame()
            .map_err(|e| TransportError::SendError(e.to_string()))?;
        self.send_frame(frame).await
    }
}
