//! Inbound intents

use chrono::Utc;
use nodeplane_db::entities::{client, inbound};
use nodeplane_proto::{Command, RemoveInboundPayload};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{conflict_or_db, non_empty, validate_port, Reconciler};
use crate::error::{Applied, ControlError, ControlResult, SyncOutcome};
use crate::resync;

const DEFAULT_LISTEN: &str = "0.0.0.0";

/// A new inbound
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundSpec {
    pub node_id: i64,
    /// Generated as `inbound-<id>` when empty
    pub tag: Option<String>,
    pub protocol: String,
    /// Defaults to `0.0.0.0`
    pub listen: Option<String>,
    pub port: i32,
    pub settings_json: Option<String>,
    pub stream_settings_json: Option<String>,
    pub sniffing_json: Option<String>,
    pub remark: Option<String>,
}

/// Changes to an existing inbound; `None` and empty strings leave a field as is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundPatch {
    pub tag: Option<String>,
    pub protocol: Option<String>,
    pub listen: Option<String>,
    pub port: Option<i32>,
    pub settings_json: Option<String>,
    pub stream_settings_json: Option<String>,
    pub sniffing_json: Option<String>,
    pub remark: Option<String>,
}

/// A removed inbound and how many clients went with it
#[derive(Debug, Clone)]
pub struct DeletedInbound {
    pub inbound: inbound::Model,
    pub clients_removed: u64,
}

impl Reconciler {
    /// Store a new inbound and add it to its node
    pub async fn create_inbound(
        &self,
        spec: InboundSpec,
    ) -> ControlResult<Applied<inbound::Model>> {
        let protocol = spec.protocol.trim().to_string();
        if protocol.is_empty() {
            return Err(ControlError::validation("protocol is required"));
        }
        validate_port(spec.port)?;

        let node = self.find_node(spec.node_id).await?;
        let tag = non_empty(spec.tag);

        self.ensure_port_free(node.id, spec.port, None).await?;
        if let Some(tag) = &tag {
            self.ensure_tag_free(node.id, tag, None).await?;
        }

        let now = Utc::now();
        let placeholder = format!("pending-{}", Uuid::new_v4().simple());
        let model = inbound::ActiveModel {
            node_id: Set(node.id),
            tag: Set(tag.clone().unwrap_or(placeholder)),
            protocol: Set(protocol),
            listen: Set(non_empty(spec.listen).unwrap_or_else(|| DEFAULT_LISTEN.to_string())),
            port: Set(spec.port),
            settings_json: Set(spec.settings_json.unwrap_or_else(|| "{}".to_string())),
            stream_settings_json: Set(spec.stream_settings_json.unwrap_or_default()),
            sniffing_json: Set(spec.sniffing_json.unwrap_or_default()),
            remark: Set(non_empty(spec.remark)),
            enable: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        // The generated tag needs the row id, so insert and rename commit together
        let txn = self.db.begin().await?;
        let mut created = model.insert(&txn).await.map_err(|e| {
            conflict_or_db(e, || {
                format!("port {} or tag is already used on node {}", spec.port, node.id)
            })
        })?;

        if tag.is_none() {
            let generated = format!("inbound-{}", created.id);
            let mut active: inbound::ActiveModel = created.into();
            active.tag = Set(generated.clone());
            created = active.update(&txn).await.map_err(|e| {
                conflict_or_db(e, || {
                    format!("tag {} is already used on node {}", generated, node.id)
                })
            })?;
        }
        txn.commit().await?;

        info!(
            node_id = node.id,
            inbound_id = created.id,
            tag = %created.tag,
            port = created.port,
            "Inbound created"
        );

        let sync = match resync::descriptor(&created, resync::merge_clients(&created, &[])) {
            Some(descriptor) => self.propagate(node.id, Command::AddInbound(descriptor)).await,
            None => SyncOutcome::Skipped,
        };

        Ok(Applied::new(created, sync))
    }

    /// Change an inbound's listener definition and resync its node
    pub async fn update_inbound(
        &self,
        inbound_id: i64,
        patch: InboundPatch,
    ) -> ControlResult<Applied<inbound::Model>> {
        let existing = self.find_inbound(inbound_id).await?;
        let node_id = existing.node_id;

        let tag = non_empty(patch.tag);
        let protocol = non_empty(patch.protocol);

        if let Some(port) = patch.port {
            validate_port(port)?;
            if port != existing.port {
                self.ensure_port_free(node_id, port, Some(existing.id)).await?;
            }
        }
        if let Some(tag) = &tag {
            if *tag != existing.tag {
                self.ensure_tag_free(node_id, tag, Some(existing.id)).await?;
            }
        }

        let mut active: inbound::ActiveModel = existing.into();
        if let Some(tag) = tag {
            active.tag = Set(tag);
        }
        if let Some(protocol) = protocol {
            active.protocol = Set(protocol);
        }
        if let Some(listen) = non_empty(patch.listen) {
            active.listen = Set(listen);
        }
        if let Some(port) = patch.port {
            active.port = Set(port);
        }
        if let Some(settings) = non_empty(patch.settings_json) {
            active.settings_json = Set(settings);
        }
        if let Some(stream) = non_empty(patch.stream_settings_json) {
            active.stream_settings_json = Set(stream);
        }
        if let Some(sniffing) = non_empty(patch.sniffing_json) {
            active.sniffing_json = Set(sniffing);
        }
        if let Some(remark) = non_empty(patch.remark) {
            active.remark = Set(Some(remark));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&self.db).await.map_err(|e| {
            conflict_or_db(e, || format!("port or tag is already used on node {}", node_id))
        })?;

        info!(node_id, inbound_id, "Inbound updated");

        let sync = self.resync(node_id).await;
        Ok(Applied::new(updated, sync))
    }

    /// Enable or disable an inbound and resync its node
    pub async fn set_inbound_enabled(
        &self,
        inbound_id: i64,
        enable: bool,
    ) -> ControlResult<Applied<inbound::Model>> {
        let existing = self.find_inbound(inbound_id).await?;
        let node_id = existing.node_id;

        let mut active: inbound::ActiveModel = existing.into();
        active.enable = Set(enable);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        info!(node_id, inbound_id, enable, "Inbound toggled");

        let sync = self.resync(node_id).await;
        Ok(Applied::new(updated, sync))
    }

    pub async fn enable_inbound(&self, inbound_id: i64) -> ControlResult<Applied<inbound::Model>> {
        self.set_inbound_enabled(inbound_id, true).await
    }

    pub async fn disable_inbound(
        &self,
        inbound_id: i64,
    ) -> ControlResult<Applied<inbound::Model>> {
        self.set_inbound_enabled(inbound_id, false).await
    }

    /// Delete an inbound with all of its clients, then remove it from its node
    pub async fn delete_inbound(&self, inbound_id: i64) -> ControlResult<Applied<DeletedInbound>> {
        let existing = self.find_inbound(inbound_id).await?;

        let txn = self.db.begin().await?;
        let clients_removed = client::Entity::delete_many()
            .filter(client::Column::InboundId.eq(inbound_id))
            .exec(&txn)
            .await?
            .rows_affected;
        inbound::Entity::delete_by_id(inbound_id).exec(&txn).await?;
        txn.commit().await?;

        info!(
            node_id = existing.node_id,
            inbound_id,
            clients_removed,
            "Inbound deleted"
        );

        let sync = self
            .propagate(
                existing.node_id,
                Command::RemoveInbound(RemoveInboundPayload {
                    tag: existing.tag.clone(),
                }),
            )
            .await;

        Ok(Applied::new(
            DeletedInbound {
                inbound: existing,
                clients_removed,
            },
            sync,
        ))
    }

    /// Inbounds, optionally of one node, ordered by id
    pub async fn list_inbounds(&self, node_id: Option<i64>) -> ControlResult<Vec<inbound::Model>> {
        let mut query = inbound::Entity::find().order_by_asc(inbound::Column::Id);
        if let Some(node_id) = node_id {
            query = query.filter(inbound::Column::NodeId.eq(node_id));
        }
        Ok(query.all(&self.db).await?)
    }

    async fn ensure_port_free(
        &self,
        node_id: i64,
        port: i32,
        exclude: Option<i64>,
    ) -> ControlResult<()> {
        let mut query = inbound::Entity::find()
            .filter(inbound::Column::NodeId.eq(node_id))
            .filter(inbound::Column::Port.eq(port));
        if let Some(id) = exclude {
            query = query.filter(inbound::Column::Id.ne(id));
        }
        if query.count(&self.db).await? > 0 {
            return Err(ControlError::conflict(format!(
                "port {} is already used by another inbound on node {}",
                port, node_id
            )));
        }
        Ok(())
    }

    async fn ensure_tag_free(
        &self,
        node_id: i64,
        tag: &str,
        exclude: Option<i64>,
    ) -> ControlResult<()> {
        let mut query = inbound::Entity::find()
            .filter(inbound::Column::NodeId.eq(node_id))
            .filter(inbound::Column::Tag.eq(tag));
        if let Some(id) = exclude {
            query = query.filter(inbound::Column::Id.ne(id));
        }
        if query.count(&self.db).await? > 0 {
            return Err(ControlError::conflict(format!(
                "tag {} is already used by another inbound on node {}",
                tag, node_id
            )));
        }
        Ok(())
    }
}
