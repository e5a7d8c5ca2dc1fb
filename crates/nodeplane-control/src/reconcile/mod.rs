//! Reconciliation engine
//!
//! Every intent commits to storage first and then pushes the change to the
//! node that owns it. Changes that touch one object go out as incremental
//! commands; changes that could alter how a node builds its listeners go out
//! as a full `ApplyConfig`. A push that fails is logged and reported in the
//! returned [`SyncOutcome`]; the committed row is never rolled back.

mod cert;
mod client;
mod inbound;
mod node;
mod traffic;

pub use cert::CertSpec;
pub use client::{ClientPatch, ClientSpec};
pub use inbound::{DeletedInbound, InboundPatch, InboundSpec};
pub use node::ReconcileReport;
pub use traffic::TrafficSummary;

use dashmap::DashMap;
use nodeplane_db::entities::{client as client_entity, inbound as inbound_entity, node as node_entity};
use nodeplane_proto::{ApplyConfigPayload, Command};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, SqlErr,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::SweepConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ControlError, ControlResult, SyncOutcome};
use crate::resync;

/// Owns every mutation of inbounds, clients and certificates
pub struct Reconciler {
    db: DatabaseConnection,
    dispatcher: Arc<Dispatcher>,
    sweep: SweepConfig,
    node_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Reconciler {
    pub fn new(db: DatabaseConnection, dispatcher: Arc<Dispatcher>, sweep: SweepConfig) -> Self {
        Self {
            db,
            dispatcher,
            sweep,
            node_locks: DashMap::new(),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn sweep_config(&self) -> &SweepConfig {
        &self.sweep
    }

    /// The `ApplyConfig` a node should be running right now
    ///
    /// Enabled inbounds ordered by id, each with its enabled clients merged
    /// into its settings.
    pub async fn apply_config_payload(&self, node_id: i64) -> ControlResult<ApplyConfigPayload> {
        let inbounds = inbound_entity::Entity::find()
            .filter(inbound_entity::Column::NodeId.eq(node_id))
            .filter(inbound_entity::Column::Enable.eq(true))
            .order_by_asc(inbound_entity::Column::Id)
            .all(&self.db)
            .await?;

        let mut clients_by_inbound: HashMap<i64, Vec<client_entity::Model>> = HashMap::new();
        if !inbounds.is_empty() {
            let ids: Vec<i64> = inbounds.iter().map(|ib| ib.id).collect();
            let clients = client_entity::Entity::find()
                .filter(client_entity::Column::InboundId.is_in(ids))
                .filter(client_entity::Column::Enable.eq(true))
                .order_by_asc(client_entity::Column::Id)
                .all(&self.db)
                .await?;
            for client in clients {
                clients_by_inbound
                    .entry(client.inbound_id)
                    .or_default()
                    .push(client);
            }
        }

        let descriptors = inbounds
            .iter()
            .filter_map(|ib| {
                let clients = clients_by_inbound
                    .get(&ib.id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                resync::descriptor(ib, resync::merge_clients(ib, clients))
            })
            .collect();

        Ok(ApplyConfigPayload {
            inbounds: descriptors,
        })
    }

    /// Send one command for an already committed change
    async fn propagate(&self, node_id: i64, command: Command) -> SyncOutcome {
        let kind = command.kind();
        match self.dispatcher.send(node_id, &command).await {
            Ok(_) => {
                debug!(node_id, command = %kind, "Change applied on node");
                SyncOutcome::Applied
            }
            Err(e) => {
                warn!(node_id, command = %kind, error = %e, "Change stored but not applied on node");
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Replace the node's live configuration with the stored enabled set
    async fn resync(&self, node_id: i64) -> SyncOutcome {
        match self.apply_config_payload(node_id).await {
            Ok(payload) => self.propagate(node_id, Command::ApplyConfig(payload)).await,
            Err(e) => {
                warn!(node_id, error = %e, "Could not build full resync");
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn node_lock(&self, node_id: i64) -> Arc<Mutex<()>> {
        self.node_locks.entry(node_id).or_default().clone()
    }

    async fn find_node(&self, node_id: i64) -> ControlResult<node_entity::Model> {
        node_entity::Entity::find_by_id(node_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("node {} not found", node_id)))
    }

    async fn find_inbound(&self, inbound_id: i64) -> ControlResult<inbound_entity::Model> {
        inbound_entity::Entity::find_by_id(inbound_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("inbound {} not found", inbound_id)))
    }

    async fn find_client(&self, client_id: i64) -> ControlResult<client_entity::Model> {
        client_entity::Entity::find_by_id(client_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("client {} not found", client_id)))
    }
}

/// Unique-index violations become conflicts, anything else stays a database error
fn conflict_or_db(err: DbErr, message: impl FnOnce() -> String) -> ControlError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ControlError::Conflict(message()),
        _ => ControlError::Database(err),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn validate_port(port: i32) -> ControlResult<()> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(ControlError::validation(format!(
            "port {} is out of range 1-65535",
            port
        )))
    }
}
