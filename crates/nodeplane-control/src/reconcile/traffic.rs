//! Traffic accounting

use nodeplane_db::entities::{client, inbound, user};
use nodeplane_proto::{Command, TrafficQuery, TrafficReport};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::client::remove_client;
use super::Reconciler;
use crate::error::{Applied, ControlResult, SyncOutcome};

/// Result of one traffic collection from a node
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSummary {
    pub node_id: i64,
    /// Clients whose counters moved
    pub clients_updated: usize,
    pub upload: i64,
    pub download: i64,
    /// Emails the node reported that this node has no client for
    pub unknown: Vec<String>,
    /// Emails disabled for exceeding their quota
    pub disabled: Vec<String>,
}

impl Reconciler {
    /// Pull and reset the node's per-client counters, then account them
    ///
    /// Deltas only ever add to stored counters. A client that reaches its
    /// quota is disabled and removed from the node.
    pub async fn collect_traffic(&self, node_id: i64) -> ControlResult<Applied<TrafficSummary>> {
        let node = self.find_node(node_id).await?;
        let mut summary = TrafficSummary {
            node_id: node.id,
            ..Default::default()
        };

        let data = match self
            .dispatcher
            .send(node.id, &Command::GetTraffic(TrafficQuery { reset: true }))
            .await
        {
            Ok(data) => data,
            Err(e) => {
                warn!(node_id, error = %e, "Traffic collection failed");
                return Ok(Applied::new(
                    summary,
                    SyncOutcome::Failed {
                        reason: e.to_string(),
                    },
                ));
            }
        };

        let report = match data.map(serde_json::from_value::<TrafficReport>) {
            None => TrafficReport::default(),
            Some(Ok(report)) => report,
            Some(Err(e)) => {
                warn!(node_id, error = %e, "Malformed traffic report");
                return Ok(Applied::new(
                    summary,
                    SyncOutcome::Failed {
                        reason: format!("malformed traffic report: {}", e),
                    },
                ));
            }
        };

        let deltas: Vec<(String, i64, i64)> = report
            .clients
            .into_iter()
            .map(|entry| (entry.email, entry.u.max(0), entry.d.max(0)))
            .filter(|(_, u, d)| *u > 0 || *d > 0)
            .collect();
        if deltas.is_empty() {
            debug!(node_id, "No traffic to account");
            return Ok(Applied::new(summary, SyncOutcome::Applied));
        }

        let inbounds: HashMap<i64, inbound::Model> = inbound::Entity::find()
            .filter(inbound::Column::NodeId.eq(node.id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|ib| (ib.id, ib))
            .collect();

        let emails: Vec<String> = deltas.iter().map(|(email, _, _)| email.clone()).collect();
        let clients: HashMap<String, client::Model> = client::Entity::find()
            .filter(client::Column::Email.is_in(emails))
            .filter(client::Column::InboundId.is_in(inbounds.keys().copied()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|c| (c.email.clone(), c))
            .collect();

        let mut exhausted = Vec::new();
        let txn = self.db.begin().await?;
        for (email, up, down) in deltas {
            let Some(record) = clients.get(&email) else {
                summary.unknown.push(email);
                continue;
            };

            client::Entity::update_many()
                .col_expr(
                    client::Column::UpTraffic,
                    Expr::col(client::Column::UpTraffic).add(up),
                )
                .col_expr(
                    client::Column::DownTraffic,
                    Expr::col(client::Column::DownTraffic).add(down),
                )
                .filter(client::Column::Id.eq(record.id))
                .exec(&txn)
                .await?;

            if let Some(user_id) = record.user_id {
                user::Entity::update_many()
                    .col_expr(user::Column::OutFlow, Expr::col(user::Column::OutFlow).add(up))
                    .col_expr(user::Column::InFlow, Expr::col(user::Column::InFlow).add(down))
                    .filter(user::Column::Id.eq(user_id))
                    .exec(&txn)
                    .await?;
            }

            let mut after = record.clone();
            after.up_traffic = after.up_traffic.saturating_add(up);
            after.down_traffic = after.down_traffic.saturating_add(down);
            if after.enable && after.over_quota() {
                client::Entity::update_many()
                    .col_expr(client::Column::Enable, Expr::value(false))
                    .filter(client::Column::Id.eq(record.id))
                    .exec(&txn)
                    .await?;
                after.enable = false;
                exhausted.push(after);
            }

            summary.clients_updated += 1;
            summary.upload = summary.upload.saturating_add(up);
            summary.download = summary.download.saturating_add(down);
        }
        txn.commit().await?;

        if !summary.unknown.is_empty() {
            debug!(node_id, unknown = ?summary.unknown, "Traffic reported for unknown clients");
        }

        let mut sync = SyncOutcome::Applied;
        for record in exhausted {
            info!(node_id, email = %record.email, "Client reached its quota, disabling");
            summary.disabled.push(record.email.clone());

            let Some(parent) = inbounds.get(&record.inbound_id) else {
                continue;
            };
            if !parent.enable {
                continue;
            }
            let outcome = self
                .propagate(node.id, remove_client(parent, &record))
                .await;
            if outcome.is_failed() {
                sync = outcome;
            }
        }

        info!(
            node_id,
            clients = summary.clients_updated,
            upload = summary.upload,
            download = summary.download,
            "Traffic collected"
        );

        Ok(Applied::new(summary, sync))
    }
}
