//! Subscription link encoding
//!
//! One encoder per known [`ProtocolKind`], looked up in a fixed table.
//! `ProtocolKind::Other` has no entry, so its inbounds yield no link.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use nodeplane_db::entities::{client, inbound, node};
use nodeplane_proto::ProtocolKind;
use serde::Serialize;

/// Cipher shadowsocks links are rendered with
pub const SHADOWSOCKS_METHOD: &str = "aes-256-gcm";

/// Everything a link is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget<'a> {
    pub host: &'a str,
    pub port: i32,
    pub secret: &'a str,
    pub alter_id: i32,
    pub flow: Option<&'a str>,
    pub remark: &'a str,
}

impl<'a> LinkTarget<'a> {
    /// Client remark, else inbound remark, else inbound tag
    pub fn from_records(
        client: &'a client::Model,
        inbound: &'a inbound::Model,
        node: &'a node::Model,
    ) -> Self {
        Self {
            host: &node.server_ip,
            port: inbound.port,
            secret: &client.uuid_or_password,
            alter_id: client.alter_id,
            flow: client.flow.as_deref(),
            remark: display_remark(client, inbound),
        }
    }
}

pub fn display_remark<'a>(client: &'a client::Model, inbound: &'a inbound::Model) -> &'a str {
    non_empty(client.remark.as_deref())
        .or_else(|| non_empty(inbound.remark.as_deref()))
        .unwrap_or(&inbound.tag)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

type Encoder = fn(&LinkTarget<'_>) -> String;

const ENCODERS: [(ProtocolKind, Encoder); 4] = [
    (ProtocolKind::Vmess, vmess),
    (ProtocolKind::Vless, vless),
    (ProtocolKind::Trojan, trojan),
    (ProtocolKind::Shadowsocks, shadowsocks),
];

/// Render the link for `kind`, or `None` when the protocol has no link form
pub fn encode(kind: ProtocolKind, target: &LinkTarget<'_>) -> Option<String> {
    ENCODERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, encoder)| encoder(target))
}

/// Link for a stored client, keyed by its inbound's protocol name
pub fn client_link(
    client: &client::Model,
    inbound: &inbound::Model,
    node: &node::Model,
) -> Option<String> {
    encode(
        ProtocolKind::parse(&inbound.protocol),
        &LinkTarget::from_records(client, inbound, node),
    )
}

/// Form-style percent encoding of a remark (UTF-8 bytes, space as `+`)
pub fn encode_remark(remark: &str) -> String {
    url::form_urlencoded::byte_serialize(remark.as_bytes()).collect()
}

/// Field order matters to some clients
#[derive(Serialize)]
struct VmessDocument<'a> {
    v: &'static str,
    ps: &'a str,
    add: &'a str,
    port: i32,
    id: &'a str,
    aid: i32,
    scy: &'static str,
    net: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    host: &'static str,
    path: &'static str,
    tls: &'static str,
}

fn vmess(target: &LinkTarget<'_>) -> String {
    let doc = VmessDocument {
        v: "2",
        ps: target.remark,
        add: target.host,
        port: target.port,
        id: target.secret,
        aid: target.alter_id,
        scy: "auto",
        net: "tcp",
        kind: "none",
        host: "",
        path: "",
        tls: "",
    };
    // Serializing a struct of plain strings and integers cannot fail
    let json = serde_json::to_string(&doc).unwrap_or_default();
    format!("vmess://{}", BASE64.encode(json.as_bytes()))
}

fn vless(target: &LinkTarget<'_>) -> String {
    let mut link = format!(
        "vless://{}@{}:{}?encryption=none",
        target.secret, target.host, target.port
    );
    if let Some(flow) = non_empty(target.flow) {
        link.push_str("&flow=");
        link.push_str(flow);
    }
    link.push_str("&type=tcp#");
    link.push_str(&encode_remark(target.remark));
    link
}

fn trojan(target: &LinkTarget<'_>) -> String {
    format!(
        "trojan://{}@{}:{}?type=tcp#{}",
        target.secret,
        target.host,
        target.port,
        encode_remark(target.remark)
    )
}

fn shadowsocks(target: &LinkTarget<'_>) -> String {
    let user_info = BASE64.encode(format!("{}:{}", SHADOWSOCKS_METHOD, target.secret));
    format!(
        "ss://{}@{}:{}#{}",
        user_info,
        target.host,
        target.port,
        encode_remark(target.remark)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn target<'a>(flow: Option<&'a str>, remark: &'a str) -> LinkTarget<'a> {
        LinkTarget {
            host: "203.0.113.10",
            port: 443,
            secret: "0b6c2f1e-1111-4a4a-8b8b-222222222222",
            alter_id: 0,
            flow,
            remark,
        }
    }

    #[test]
    fn test_vmess_round_trip() {
        let mut t = target(None, "HK 01");
        t.alter_id = 4;
        let link = encode(ProtocolKind::Vmess, &t).unwrap();

        let payload = link.strip_prefix("vmess://").unwrap();
        let json = BASE64.decode(payload).unwrap();
        let doc: Value = serde_json::from_slice(&json).unwrap();

        assert_eq!(doc["add"], "203.0.113.10");
        assert_eq!(doc["port"], 443);
        assert_eq!(doc["id"], "0b6c2f1e-1111-4a4a-8b8b-222222222222");
        assert_eq!(doc["aid"], 4);
        assert_eq!(doc["ps"], "HK 01");
        assert_eq!(doc["v"], "2");
        assert_eq!(doc["scy"], "auto");
        assert_eq!(doc["net"], "tcp");
        assert_eq!(doc["type"], "none");
    }

    #[test]
    fn test_vmess_field_order() {
        let link = encode(ProtocolKind::Vmess, &target(None, "r")).unwrap();
        let json = BASE64.decode(link.strip_prefix("vmess://").unwrap()).unwrap();
        let text = String::from_utf8(json).unwrap();

        assert!(text.starts_with(r#"{"v":"2","ps":"r","add":"203.0.113.10","port":443,"#));
        assert!(text.ends_with(r#""host":"","path":"","tls":""}"#));
    }

    #[test]
    fn test_vless_omits_empty_flow() {
        let none = encode(ProtocolKind::Vless, &target(None, "a")).unwrap();
        let empty = encode(ProtocolKind::Vless, &target(Some(""), "a")).unwrap();

        let expected =
            "vless://0b6c2f1e-1111-4a4a-8b8b-222222222222@203.0.113.10:443?encryption=none&type=tcp#a";
        assert_eq!(none, expected);
        assert_eq!(empty, expected);
        assert!(!none.contains("flow="));
    }

    #[test]
    fn test_vless_includes_flow_verbatim() {
        let link = encode(ProtocolKind::Vless, &target(Some("xtls-rprx-vision"), "a")).unwrap();
        assert!(link.contains("?encryption=none&flow=xtls-rprx-vision&type=tcp#a"));
    }

    #[test]
    fn test_trojan_link() {
        let mut t = target(None, "my node");
        t.secret = "hunter2";
        let link = encode(ProtocolKind::Trojan, &t).unwrap();
        assert_eq!(link, "trojan://hunter2@203.0.113.10:443?type=tcp#my+node");
    }

    #[test]
    fn test_shadowsocks_link() {
        let mut t = target(None, "ss");
        t.secret = "0123456789abcdef";
        let link = encode(ProtocolKind::Shadowsocks, &t).unwrap();

        let rest = link.strip_prefix("ss://").unwrap();
        let (user_info, tail) = rest.split_once('@').unwrap();
        assert_eq!(tail, "203.0.113.10:443#ss");

        let decoded = String::from_utf8(BASE64.decode(user_info).unwrap()).unwrap();
        assert_eq!(decoded, "aes-256-gcm:0123456789abcdef");
    }

    #[test]
    fn test_unknown_protocol_has_no_link() {
        assert!(encode(ProtocolKind::Other, &target(None, "x")).is_none());
    }

    #[test]
    fn test_remark_encoding_is_utf8_form_style() {
        assert_eq!(encode_remark("香港 #1"), "%E9%A6%99%E6%B8%AF+%231");
        assert_eq!(encode_remark("plain"), "plain");
    }
}
