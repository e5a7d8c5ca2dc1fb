//! Full-resync document construction
//!
//! Agents receive each inbound's settings with the enabled clients merged
//! into `settings.clients`, shaped the way the inbound's protocol expects.

use nodeplane_db::entities::{client, inbound};
use nodeplane_proto::{InboundDescriptor, ProtocolKind};
use serde_json::{json, Map, Value};
use tracing::warn;

/// One client in the shape its protocol expects
pub fn client_entry(protocol: ProtocolKind, client: &client::Model) -> Value {
    let mut entry = Map::new();
    entry.insert("email".to_string(), json!(client.email));
    entry.insert("level".to_string(), json!(0));

    match protocol {
        ProtocolKind::Vmess => {
            entry.insert("id".to_string(), json!(client.uuid_or_password));
            entry.insert("alterId".to_string(), json!(client.alter_id));
        }
        ProtocolKind::Vless => {
            entry.insert("id".to_string(), json!(client.uuid_or_password));
            entry.insert(
                "flow".to_string(),
                json!(client.flow.as_deref().unwrap_or_default()),
            );
        }
        ProtocolKind::Trojan | ProtocolKind::Shadowsocks => {
            entry.insert("password".to_string(), json!(client.uuid_or_password));
        }
        ProtocolKind::Other => {}
    }

    Value::Object(entry)
}

/// The inbound's settings with `clients` replaced by `clients`
///
/// Settings that are not a JSON object are treated as `{}`.
pub fn merge_clients(inbound: &inbound::Model, clients: &[client::Model]) -> String {
    let mut settings = match serde_json::from_str::<Value>(&inbound.settings_json) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let protocol = ProtocolKind::parse(&inbound.protocol);
    let entries: Vec<Value> = clients
        .iter()
        .filter(|c| c.enable)
        .map(|c| client_entry(protocol, c))
        .collect();
    settings.insert("clients".to_string(), Value::Array(entries));

    Value::Object(settings).to_string()
}

/// Wire descriptor of a stored inbound, with `settings_json` supplied by the caller
///
/// `None` when the stored port does not fit a port number.
pub fn descriptor(inbound: &inbound::Model, settings_json: String) -> Option<InboundDescriptor> {
    let port = match u16::try_from(inbound.port) {
        Ok(port) if port > 0 => port,
        _ => {
            warn!(
                inbound_id = inbound.id,
                port = inbound.port,
                "Skipping inbound with out-of-range port"
            );
            return None;
        }
    };

    Some(InboundDescriptor {
        tag: inbound.tag.clone(),
        protocol: inbound.protocol.clone(),
        listen: inbound.listen.clone(),
        port,
        settings_json,
        stream_settings_json: inbound.stream_settings_json.clone(),
        sniffing_json: inbound.sniffing_json.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn inbound(protocol: &str, settings: &str) -> inbound::Model {
        inbound::Model {
            id: 1,
            node_id: 1,
            tag: "in-1".to_string(),
            protocol: protocol.to_string(),
            listen: "0.0.0.0".to_string(),
            port: 443,
            settings_json: settings.to_string(),
            stream_settings_json: r#"{"network":"tcp"}"#.to_string(),
            sniffing_json: String::new(),
            remark: None,
            enable: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn client(email: &str, enable: bool) -> client::Model {
        client::Model {
            id: 1,
            inbound_id: 1,
            user_id: None,
            email: email.to_string(),
            uuid_or_password: "secret-1".to_string(),
            flow: Some("xtls-rprx-vision".to_string()),
            alter_id: 2,
            total_traffic: 0,
            up_traffic: 0,
            down_traffic: 0,
            exp_time: None,
            enable,
            remark: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_shapes_per_protocol() {
        let c = client("a@nodeplane", true);

        let vmess = client_entry(ProtocolKind::Vmess, &c);
        assert_eq!(vmess, json!({"email": "a@nodeplane", "level": 0, "id": "secret-1", "alterId": 2}));

        let vless = client_entry(ProtocolKind::Vless, &c);
        assert_eq!(
            vless,
            json!({"email": "a@nodeplane", "level": 0, "id": "secret-1", "flow": "xtls-rprx-vision"})
        );

        let trojan = client_entry(ProtocolKind::Trojan, &c);
        assert_eq!(trojan, json!({"email": "a@nodeplane", "level": 0, "password": "secret-1"}));

        let ss = client_entry(ProtocolKind::Shadowsocks, &c);
        assert_eq!(ss, json!({"email": "a@nodeplane", "level": 0, "password": "secret-1"}));

        let other = client_entry(ProtocolKind::Other, &c);
        assert_eq!(other, json!({"email": "a@nodeplane", "level": 0}));
    }

    #[test]
    fn test_merge_keeps_settings_and_skips_disabled_clients() {
        let ib = inbound("vless", r#"{"decryption":"none","clients":[{"stale":true}]}"#);
        let clients = vec![client("on@nodeplane", true), client("off@nodeplane", false)];

        let merged: Value = serde_json::from_str(&merge_clients(&ib, &clients)).unwrap();
        assert_eq!(merged["decryption"], "none");
        let list = merged["clients"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["email"], "on@nodeplane");
    }

    #[test]
    fn test_merge_replaces_non_object_settings() {
        for raw in ["", "not json", "[1,2]", "42"] {
            let ib = inbound("trojan", raw);
            let merged: Value =
                serde_json::from_str(&merge_clients(&ib, &[client("t@nodeplane", true)])).unwrap();
            assert_eq!(merged.as_object().unwrap().len(), 1);
            assert_eq!(merged["clients"][0]["password"], "secret-1");
        }
    }

    #[test]
    fn test_descriptor_copies_fields() {
        let ib = inbound("vmess", "{}");
        let d = descriptor(&ib, "{\"clients\":[]}".to_string()).unwrap();
        assert_eq!(d.tag, "in-1");
        assert_eq!(d.port, 443);
        assert_eq!(d.settings_json, "{\"clients\":[]}");
        assert_eq!(d.stream_settings_json, r#"{"network":"tcp"}"#);
    }

    #[test]
    fn test_descriptor_rejects_bad_port() {
        let mut ib = inbound("vmess", "{}");
        ib.port = 70000;
        assert!(descriptor(&ib, "{}".to_string()).is_none());
        ib.port = 0;
        assert!(descriptor(&ib, "{}".to_string()).is_none());
    }
}
