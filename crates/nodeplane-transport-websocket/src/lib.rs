//! WebSocket transport for node channels
//!
//! Node agents dial `GET /ws/node?id=<nodeId>&secret=<secret>` and upgrade to a WebSocket.
//! Every upgraded socket is split into a [`WebSocketChannel`] (write half,
//! backed by a single writer task so concurrent frames never interleave)
//! and a [`WebSocketSource`] (read half, owned by the caller's reader task),
//! then handed to a [`NodeAcceptor`].

pub mod channel;
pub mod server;

pub use channel::{split_socket, WebSocketChannel, WebSocketSource};
pub use server::{node_router, NodeAcceptor, NodeHandshake, NODE_WS_PATH};
