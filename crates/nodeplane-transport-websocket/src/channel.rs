//! WebSocket-backed node channel

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use nodeplane_transport::{ChannelSource, NodeChannel, TransportError, TransportResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Frames queued for the writer task
#[derive(Debug)]
enum Outgoing {
    Frame(String),
    Close(String),
}

/// Write half of an upgraded node socket
#[derive(Debug)]
pub struct WebSocketChannel {
    channel_id: String,
    frame_tx: mpsc::Sender<Outgoing>,
    closed: Arc<AtomicBool>,
}

/// Read half of an upgraded node socket
pub struct WebSocketSource {
    channel_id: String,
    source: SplitStream<WebSocket>,
    closed: Arc<AtomicBool>,
}

/// Split an upgraded socket and spawn its writer task
pub fn split_socket(socket: WebSocket) -> (WebSocketChannel, WebSocketSource) {
    let channel_id = format!("ws-{}", uuid::Uuid::new_v4());
    let (sink, source) = socket.split();
    let (frame_tx, frame_rx) = mpsc::channel::<Outgoing>(256);
    let closed = Arc::new(AtomicBool::new(false));

    let closed_flag = closed.clone();
    let conn_id = channel_id.clone();
    tokio::spawn(async move {
        writer_task(sink, frame_rx, closed_flag, conn_id).await;
    });

    (
        WebSocketChannel {
            channel_id: channel_id.clone(),
            frame_tx,
            closed: closed.clone(),
        },
        WebSocketSource {
            channel_id,
            source,
            closed,
        },
    )
}

/// Writer task - drains queued frames onto the socket one at a time
async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outgoing>,
    closed: Arc<AtomicBool>,
    conn_id: String,
) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Frame(frame) => {
                trace!("[{}] Sending frame ({} bytes)", conn_id, frame.len());
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    error!("[{}] WebSocket send error: {}", conn_id, e);
                    break;
                }
            }
            Outgoing::Close(reason) => {
                debug!("[{}] Closing socket: {}", conn_id, reason);
                break;
            }
        }
    }

    debug!("[{}] WebSocket writer task ended", conn_id);
    closed.store(true, Ordering::SeqCst);
    let _ = sink.close().await;
}

#[async_trait]
impl NodeChannel for WebSocketChannel {
    async fn send_frame(&self, frame: String) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        self.frame_tx
            .send(Outgoing::Frame(frame))
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.frame_tx.send(Outgoing::Close(reason.to_string())).await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn channel_id(&self) -> String {
        self.channel_id.clone()
    }
}

#[async_trait]
impl ChannelSource for WebSocketSource {
    async fn recv_frame(&mut self) -> TransportResult<Option<String>> {
        while let Some(result) = self.source.next().await {
            match result {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => {
                        warn!("[{}] Dropping non-UTF-8 binary frame", self.channel_id);
                    }
                },
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong is answered by axum
                    trace!("[{}] Control frame", self.channel_id);
                }
                Ok(Message::Close(_)) => {
                    debug!("[{}] WebSocket close received", self.channel_id);
                    break;
                }
                Err(e) => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Err(TransportError::RecvError(e.to_string()));
                }
            }
        }

        self.closed.store(true, Ordering::SeqCst);
        Ok(None)
    }
}
