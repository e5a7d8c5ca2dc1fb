//! Upgrade route binding sockets to node identities

use async_trait::async_trait;
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::channel::{split_socket, WebSocketChannel, WebSocketSource};

/// Path node agents dial
pub const NODE_WS_PATH: &str = "/ws/node";

/// Query parameters presented by a node when it dials in
#[derive(Debug, Clone, Deserialize)]
pub struct NodeHandshake {
    pub id: i64,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Receives upgraded node sockets
#[async_trait]
pub trait NodeAcceptor: Send + Sync + 'static {
    /// Whether the node may open a session at all
    async fn authorize(&self, handshake: &NodeHandshake) -> bool;

    /// Take ownership of a freshly upgraded socket
    async fn attach(
        &self,
        handshake: NodeHandshake,
        channel: WebSocketChannel,
        source: WebSocketSource,
    );
}

/// Router exposing [`NODE_WS_PATH`]
pub fn node_router<A: NodeAcceptor>(acceptor: Arc<A>) -> Router {
    Router::new()
        .route(NODE_WS_PATH, get(upgrade::<A>))
        .with_state(acceptor)
}

async fn upgrade<A: NodeAcceptor>(
    State(acceptor): State<Arc<A>>,
    Query(handshake): Query<NodeHandshake>,
    ws: WebSocketUpgrade,
) -> Response {
    if !acceptor.authorize(&handshake).await {
        warn!(node_id = handshake.id, "Rejected node connection");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    info!(
        node_id = handshake.id,
        version = handshake.version.as_deref().unwrap_or("unknown"),
        "Node connection upgrading"
    );

    ws.on_upgrade(move |socket| async move {
        let (channel, source) = split_socket(socket);
        acceptor.attach(handshake, channel, source).await;
    })
}
