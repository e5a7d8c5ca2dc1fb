//! Node-level intents: full reconcile, lifecycle commands and connects

use nodeplane_db::entities::{node, tls_cert};
use nodeplane_proto::{Command, CommandKind};
use nodeplane_transport::{ChannelSource, NodeChannel};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::cert::cert_command;
use super::Reconciler;
use crate::error::{Applied, ControlError, ControlResult, DispatchError, SyncOutcome};

/// What one full reconcile of a node achieved
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub node_id: i64,
    /// Inbounds carried by the `ApplyConfig` the node acknowledged
    pub inbounds: usize,
    /// Certificates the node acknowledged
    pub certs: usize,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Reconciler {
    /// Push the node's complete stored state: one `ApplyConfig`, then every deployable certificate
    ///
    /// Only one reconcile per node runs at a time; a request that finds one
    /// in progress returns at once with the overlap noted in `errors`.
    pub async fn reconcile_node(&self, node_id: i64) -> ControlResult<ReconcileReport> {
        let node = self.find_node(node_id).await?;
        let started = Instant::now();
        let mut report = ReconcileReport {
            node_id: node.id,
            ..Default::default()
        };

        let lock = self.node_lock(node.id);
        let Ok(_running) = lock.try_lock() else {
            debug!(node_id, "Reconcile already in progress");
            report
                .errors
                .push(format!("reconcile of node {} already in progress", node_id));
            return Ok(report);
        };

        let payload = self.apply_config_payload(node.id).await?;
        let inbounds = payload.inbounds.len();
        match self
            .dispatcher
            .send(node.id, &Command::ApplyConfig(payload))
            .await
        {
            Ok(_) => report.inbounds = inbounds,
            Err(e) => {
                report.errors.push(format!("ApplyConfig: {}", e));
                if matches!(e, DispatchError::NodeOffline(_)) {
                    return Ok(finish(report, started));
                }
            }
        }

        let certs = tls_cert::Entity::find()
            .filter(tls_cert::Column::NodeId.eq(node.id))
            .order_by_asc(tls_cert::Column::Id)
            .all(&self.db)
            .await?;

        for cert in &certs {
            let Some(command) = cert_command(cert) else {
                continue;
            };
            match self.dispatcher.send(node.id, &command).await {
                Ok(_) => report.certs += 1,
                Err(e) => {
                    report
                        .errors
                        .push(format!("DeployCert {}: {}", cert.domain, e));
                    if matches!(e, DispatchError::NodeOffline(_)) {
                        break;
                    }
                }
            }
        }

        Ok(finish(report, started))
    }

    /// Run a lifecycle command (`Start`, `Stop`, `Restart`, `Status`) on a node
    pub async fn node_command(
        &self,
        node_id: i64,
        kind: CommandKind,
    ) -> ControlResult<Applied<Option<Value>>> {
        let command = Command::lifecycle(kind).ok_or_else(|| {
            ControlError::validation(format!("{} is not a node lifecycle command", kind))
        })?;
        let node = self.find_node(node_id).await?;

        match self.dispatcher.send(node.id, &command).await {
            Ok(data) => {
                info!(node_id, command = %kind, "Node command applied");
                Ok(Applied::new(data, SyncOutcome::Applied))
            }
            Err(e) => {
                warn!(node_id, command = %kind, error = %e, "Node command failed");
                Ok(Applied::new(
                    None,
                    SyncOutcome::Failed {
                        reason: e.to_string(),
                    },
                ))
            }
        }
    }

    /// Whether `secret` is the stored secret of an existing node
    pub async fn authenticate_node(&self, node_id: i64, secret: &str) -> ControlResult<bool> {
        let node = node::Entity::find_by_id(node_id).one(&self.db).await?;
        Ok(node.is_some_and(|n| !n.secret.is_empty() && n.secret == secret))
    }

    /// Bind a freshly connected agent and, when configured, reconcile it
    pub async fn node_connected<C, S>(
        self: &Arc<Self>,
        node_id: i64,
        version: Option<String>,
        channel: C,
        source: S,
    ) where
        C: NodeChannel + 'static,
        S: ChannelSource + 'static,
    {
        if let Some(version) = version.filter(|v| !v.is_empty()) {
            if let Err(e) = self.record_version(node_id, version).await {
                warn!(node_id, error = %e, "Failed to record agent version");
            }
        }

        self.dispatcher.attach(node_id, channel, source).await;
        info!(node_id, "Node connected");

        if self.sweep.resync_on_connect {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                match this.reconcile_node(node_id).await {
                    Ok(report) if report.is_clean() => {
                        info!(
                            node_id,
                            inbounds = report.inbounds,
                            certs = report.certs,
                            elapsed_ms = report.elapsed_ms,
                            "Node reconciled on connect"
                        );
                    }
                    Ok(report) => {
                        warn!(node_id, errors = ?report.errors, "Node reconciled on connect with errors");
                    }
                    Err(e) => error!(node_id, error = %e, "Reconcile on connect failed"),
                }
            });
        }
    }

    async fn record_version(&self, node_id: i64, version: String) -> ControlResult<()> {
        let existing = self.find_node(node_id).await?;
        if existing.version.as_deref() == Some(version.as_str()) {
            return Ok(());
        }
        let mut active: node::ActiveModel = existing.into();
        active.version = Set(Some(version));
        active.update(&self.db).await?;
        Ok(())
    }
}

fn finish(mut report: ReconcileReport, started: Instant) -> ReconcileReport {
    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    report
}
