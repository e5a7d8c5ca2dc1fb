//! Protocol message types

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::STATUS_OK;

/// Errors raised while turning frames into envelopes and back
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Every command a node agent understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
    Status,
    AddInbound,
    RemoveInbound,
    AddClient,
    RemoveClient,
    GetTraffic,
    ApplyConfig,
    DeployCert,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Start => "Start",
            CommandKind::Stop => "Stop",
            CommandKind::Restart => "Restart",
            CommandKind::Status => "Status",
            CommandKind::AddInbound => "AddInbound",
            CommandKind::RemoveInbound => "RemoveInbound",
            CommandKind::AddClient => "AddClient",
            CommandKind::RemoveClient => "RemoveClient",
            CommandKind::GetTraffic => "GetTraffic",
            CommandKind::ApplyConfig => "ApplyConfig",
            CommandKind::DeployCert => "DeployCert",
        }
    }

    /// Lifecycle commands carry no payload beyond the node they target
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            CommandKind::Start | CommandKind::Stop | CommandKind::Restart | CommandKind::Status
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope written node-ward for every dispatched command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub request_id: String,
    pub command: CommandKind,
    pub payload: Value,
}

impl CommandEnvelope {
    pub fn new(request_id: impl Into<String>, command: CommandKind, payload: Value) -> Self {
        Self {
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    pub fn to_frame(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_frame(frame: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// Outcome reported by the agent
///
/// On the wire this is a single string: `"OK"` for success, anything else is
/// the agent's error text. A missing or empty status counts as success.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseStatus {
    #[default]
    Ok,
    Error(String),
}

impl ResponseStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }

    pub fn message(&self) -> &str {
        match self {
            ResponseStatus::Ok => STATUS_OK,
            ResponseStatus::Error(msg) => msg,
        }
    }
}

impl From<Option<String>> for ResponseStatus {
    fn from(raw: Option<String>) -> Self {
        match raw {
            None => ResponseStatus::Ok,
            Some(s) if s.is_empty() || s == STATUS_OK => ResponseStatus::Ok,
            Some(s) => ResponseStatus::Error(s),
        }
    }
}

impl Serialize for ResponseStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.message())
    }
}

impl<'de> Deserialize<'de> for ResponseStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(ResponseStatus::from(raw))
    }
}

/// Envelope received from a node
///
/// Frames without a request id are unsolicited agent reports, not responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    pub fn ok(request_id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            status: ResponseStatus::Ok,
            data,
        }
    }

    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            status: ResponseStatus::Error(message.into()),
            data: None,
        }
    }

    pub fn to_frame(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_frame(frame: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// Listener descriptor used by `AddInbound` and inside `ApplyConfig`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundDescriptor {
    pub tag: String,
    pub protocol: String,
    pub listen: String,
    pub port: u16,
    pub settings_json: String,
    pub stream_settings_json: String,
    pub sniffing_json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveInboundPayload {
    pub tag: String,
}

/// Credential descriptor used by `AddClient`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDescriptor {
    pub inbound_tag: String,
    pub email: String,
    #[serde(rename = "uuidOrPassword")]
    pub secret: String,
    pub flow: String,
    pub alter_id: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveClientPayload {
    pub inbound_tag: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficQuery {
    pub reset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyConfigPayload {
    pub inbounds: Vec<InboundDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertPayload {
    pub domain: String,
    pub public_key: String,
    pub private_key: String,
}

/// Per-client byte deltas returned by `GetTraffic`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTraffic {
    pub email: String,
    #[serde(default)]
    pub u: i64,
    #[serde(default)]
    pub d: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficReport {
    #[serde(default)]
    pub clients: Vec<ClientTraffic>,
}

/// A command together with its typed payload
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Restart,
    Status,
    AddInbound(InboundDescriptor),
    RemoveInbound(RemoveInboundPayload),
    AddClient(ClientDescriptor),
    RemoveClient(RemoveClientPayload),
    GetTraffic(TrafficQuery),
    ApplyConfig(ApplyConfigPayload),
    DeployCert(CertPayload),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Start => CommandKind::Start,
            Command::Stop => CommandKind::Stop,
            Command::Restart => CommandKind::Restart,
            Command::Status => CommandKind::Status,
            Command::AddInbound(_) => CommandKind::AddInbound,
            Command::RemoveInbound(_) => CommandKind::RemoveInbound,
            Command::AddClient(_) => CommandKind::AddClient,
            Command::RemoveClient(_) => CommandKind::RemoveClient,
            Command::GetTraffic(_) => CommandKind::GetTraffic,
            Command::ApplyConfig(_) => CommandKind::ApplyConfig,
            Command::DeployCert(_) => CommandKind::DeployCert,
        }
    }

    /// Payload document for the wire
    pub fn payload(&self) -> Result<Value, FrameError> {
        let value = match self {
            Command::Start | Command::Stop | Command::Restart | Command::Status => {
                Value::Object(Default::default())
            }
            Command::AddInbound(p) => serde_json::to_value(p)?,
            Command::RemoveInbound(p) => serde_json::to_value(p)?,
            Command::AddClient(p) => serde_json::to_value(p)?,
            Command::RemoveClient(p) => serde_json::to_value(p)?,
            Command::GetTraffic(p) => serde_json::to_value(p)?,
            Command::ApplyConfig(p) => serde_json::to_value(p)?,
            Command::DeployCert(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Lifecycle command for a kind, `None` for kinds that need a payload
    pub fn lifecycle(kind: CommandKind) -> Option<Self> {
        match kind {
            CommandKind::Start => Some(Command::Start),
            CommandKind::Stop => Some(Command::Stop),
            CommandKind::Restart => Some(Command::Restart),
            CommandKind::Status => Some(Command::Status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_envelope_wire_shape() {
        let cmd = Command::RemoveClient(RemoveClientPayload {
            inbound_tag: "in-1".to_string(),
            email: "7_1700000000000@nodeplane".to_string(),
        });
        let envelope = CommandEnvelope::new("req-1", cmd.kind(), cmd.payload().unwrap());
        let value: Value = serde_json::from_str(&envelope.to_frame().unwrap()).unwrap();

        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["command"], "RemoveClient");
        assert_eq!(value["payload"]["inboundTag"], "in-1");
        assert_eq!(value["payload"]["email"], "7_1700000000000@nodeplane");
    }

    #[test]
    fn test_client_descriptor_uses_secret_wire_name() {
        let descriptor = ClientDescriptor {
            inbound_tag: "vless-in".to_string(),
            email: "a@b".to_string(),
            secret: "0b6c2f1e-1111-4a4a-8b8b-222222222222".to_string(),
            flow: "xtls-rprx-vision".to_string(),
            alter_id: 0,
            protocol: "vless".to_string(),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["uuidOrPassword"], descriptor.secret);
        assert_eq!(value["alterId"], 0);
    }

    #[test]
    fn test_lifecycle_payload_is_empty_object() {
        assert_eq!(Command::Restart.payload().unwrap(), json!({}));
        assert!(CommandKind::Status.is_lifecycle());
        assert!(!CommandKind::ApplyConfig.is_lifecycle());
        assert_eq!(Command::lifecycle(CommandKind::Stop), Some(Command::Stop));
        assert_eq!(Command::lifecycle(CommandKind::DeployCert), None);
    }

    #[test]
    fn test_response_status_ok_variants() {
        let ok = ResponseEnvelope::from_frame(r#"{"requestId":"r1","status":"OK"}"#).unwrap();
        assert!(ok.status.is_ok());

        let empty = ResponseEnvelope::from_frame(r#"{"requestId":"r2","status":""}"#).unwrap();
        assert!(empty.status.is_ok());

        let missing = ResponseEnvelope::from_frame(r#"{"requestId":"r3"}"#).unwrap();
        assert!(missing.status.is_ok());
        assert_eq!(missing.data, None);
    }

    #[test]
    fn test_response_status_error_keeps_agent_text() {
        let frame = r#"{"requestId":"r4","status":"inbound already exists","data":null}"#;
        let resp = ResponseEnvelope::from_frame(frame).unwrap();
        assert_eq!(
            resp.status,
            ResponseStatus::Error("inbound already exists".to_string())
        );
        assert_eq!(resp.status.message(), "inbound already exists");
    }

    #[test]
    fn test_unsolicited_frame_has_no_request_id() {
        let resp = ResponseEnvelope::from_frame(r#"{"data":{"memory_usage":12.5}}"#).unwrap();
        assert!(resp.request_id.is_none());
    }

    #[test]
    fn test_traffic_report_defaults() {
        let report: TrafficReport =
            serde_json::from_value(json!({"clients": [{"email": "x", "u": 5}]})).unwrap();
        assert_eq!(report.clients[0].u, 5);
        assert_eq!(report.clients[0].d, 0);

        let empty: TrafficReport = serde_json::from_value(json!({})).unwrap();
        assert!(empty.clients.is_empty());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(ResponseEnvelope::from_frame("not json").is_err());
    }
}
