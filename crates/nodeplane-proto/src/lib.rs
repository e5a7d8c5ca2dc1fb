//! Node Command Protocol Definitions
//!
//! This crate defines the envelopes exchanged between the control plane and
//! node agents, the typed payload of every command kind, and the closed set
//! of relay protocols an inbound can speak.

pub mod messages;
pub mod protocol;

pub use messages::*;
pub use protocol::ProtocolKind;

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Status text an agent uses for a successful command
pub const STATUS_OK: &str = "OK";
