//! Relay protocol kinds an inbound can speak

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of recognised relay protocols
///
/// Stored protocol names that match none of the known kinds map to `Other`:
/// they are kept and forwarded to agents but cannot be rendered as links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Other,
}

impl ProtocolKind {
    pub const KNOWN: [ProtocolKind; 4] = [
        ProtocolKind::Vmess,
        ProtocolKind::Vless,
        ProtocolKind::Trojan,
        ProtocolKind::Shadowsocks,
    ];

    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "vmess" => ProtocolKind::Vmess,
            "vless" => ProtocolKind::Vless,
            "trojan" => ProtocolKind::Trojan,
            "shadowsocks" => ProtocolKind::Shadowsocks,
            _ => ProtocolKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Vmess => "vmess",
            ProtocolKind::Vless => "vless",
            ProtocolKind::Trojan => "trojan",
            ProtocolKind::Shadowsocks => "shadowsocks",
            ProtocolKind::Other => "other",
        }
    }

    /// Whether clients of this protocol authenticate with a password
    /// rather than a UUID
    pub fn uses_password(&self) -> bool {
        matches!(self, ProtocolKind::Trojan | ProtocolKind::Shadowsocks)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
