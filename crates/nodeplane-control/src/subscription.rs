//! Subscription aggregation
//!
//! A user's subscription is one link per usable client plus the traffic
//! totals subscription clients show next to it. A client is usable when it
//! is enabled, its inbound is enabled and its node is active.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use nodeplane_db::entities::{client, inbound, node, user};
use nodeplane_proto::ProtocolKind;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::link::{self, LinkTarget};
use crate::reconcile::Reconciler;

const BYTES_PER_GIB: i64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionLink {
    pub protocol: ProtocolKind,
    pub remark: String,
    pub node_name: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub links: Vec<SubscriptionLink>,
    /// Bytes
    pub upload: i64,
    /// Bytes
    pub download: i64,
    /// Quota in bytes
    pub total: i64,
    /// Unix seconds
    pub expire: i64,
}

impl Subscription {
    /// Standard base64 of the links, each terminated by a newline
    pub fn body(&self) -> String {
        let text: String = self
            .links
            .iter()
            .map(|l| format!("{}\n", l.link))
            .collect();
        BASE64.encode(text)
    }

    /// Value for the `subscription-userinfo` response header
    pub fn userinfo_header(&self) -> String {
        format!(
            "upload={}; download={}; total={}; expire={}",
            self.upload, self.download, self.total, self.expire
        )
    }
}

impl Reconciler {
    pub async fn subscription_for_user(&self, user_id: i64) -> ControlResult<Subscription> {
        let owner = user::Entity::find_by_id(user_id)
            .one(self.db())
            .await?
            .ok_or_else(|| ControlError::not_found(format!("user {} not found", user_id)))?;

        let clients = client::Entity::find()
            .filter(client::Column::UserId.eq(owner.id))
            .filter(client::Column::Enable.eq(true))
            .order_by_asc(client::Column::Id)
            .all(self.db())
            .await?;

        let inbound_ids: Vec<i64> = clients.iter().map(|c| c.inbound_id).collect();
        let inbounds: HashMap<i64, inbound::Model> = inbound::Entity::find()
            .filter(inbound::Column::Id.is_in(inbound_ids))
            .filter(inbound::Column::Enable.eq(true))
            .all(self.db())
            .await?
            .into_iter()
            .map(|ib| (ib.id, ib))
            .collect();

        let node_ids: Vec<i64> = inbounds.values().map(|ib| ib.node_id).collect();
        let nodes: HashMap<i64, node::Model> = node::Entity::find()
            .filter(node::Column::Id.is_in(node_ids))
            .all(self.db())
            .await?
            .into_iter()
            .filter(|n| n.is_active())
            .map(|n| (n.id, n))
            .collect();

        let mut subscription = Subscription {
            upload: owner.out_flow,
            download: owner.in_flow,
            total: owner.flow.saturating_mul(BYTES_PER_GIB),
            expire: owner.exp_time / 1000,
            ..Default::default()
        };

        for client in &clients {
            let Some(parent) = inbounds.get(&client.inbound_id) else {
                continue;
            };
            let Some(host) = nodes.get(&parent.node_id) else {
                continue;
            };

            subscription.upload = subscription.upload.saturating_add(client.up_traffic);
            subscription.download = subscription.download.saturating_add(client.down_traffic);

            let protocol = ProtocolKind::parse(&parent.protocol);
            let target = LinkTarget::from_records(client, parent, host);
            match link::encode(protocol, &target) {
                Some(uri) => subscription.links.push(SubscriptionLink {
                    protocol,
                    remark: target.remark.to_string(),
                    node_name: host.name.clone(),
                    link: uri,
                }),
                None => debug!(
                    client_id = client.id,
                    protocol = %parent.protocol,
                    "No link form for protocol, skipping"
                ),
            }
        }

        Ok(subscription)
    }
}
