//! Client intents

use chrono::Utc;
use nodeplane_db::entities::{client, inbound, user};
use nodeplane_proto::{ClientDescriptor, Command, ProtocolKind, RemoveClientPayload};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{conflict_or_db, non_empty, Reconciler};
use crate::error::{Applied, ControlError, ControlResult, SyncOutcome};
use crate::link;

const EMAIL_DOMAIN: &str = "nodeplane";
const SHADOWSOCKS_PASSWORD_LEN: usize = 16;

/// A new client on an existing inbound
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSpec {
    pub inbound_id: i64,
    pub user_id: Option<i64>,
    /// Synthesised from the user id and the current time when empty
    pub email: Option<String>,
    /// UUID or password; generated when empty
    pub secret: Option<String>,
    pub flow: Option<String>,
    pub alter_id: i32,
    /// Quota in bytes, 0 for unlimited
    pub total_traffic: i64,
    pub exp_time: Option<i64>,
    pub remark: Option<String>,
    /// Defaults to enabled
    pub enable: Option<bool>,
}

/// Changes to an existing client
///
/// `enable` decides what reaches the node: `Some(false)` removes the client,
/// `Some(true)` re-adds it with the updated values, `None` only touches storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientPatch {
    pub secret: Option<String>,
    pub flow: Option<String>,
    pub alter_id: Option<i32>,
    pub total_traffic: Option<i64>,
    pub exp_time: Option<i64>,
    pub remark: Option<String>,
    pub enable: Option<bool>,
}

impl Reconciler {
    /// Store a new client and add it to its inbound on the node
    pub async fn create_client(&self, spec: ClientSpec) -> ControlResult<Applied<client::Model>> {
        if spec.total_traffic < 0 {
            return Err(ControlError::validation("total traffic cannot be negative"));
        }

        let parent = self.find_inbound(spec.inbound_id).await?;
        if let Some(user_id) = spec.user_id {
            if user::Entity::find_by_id(user_id).one(&self.db).await?.is_none() {
                return Err(ControlError::not_found(format!("user {} not found", user_id)));
            }
        }

        let email = match non_empty(spec.email) {
            Some(email) => {
                if self.email_taken(&email).await? {
                    return Err(ControlError::conflict(format!(
                        "email {} is already in use",
                        email
                    )));
                }
                email
            }
            None => self.generate_email(spec.user_id).await?,
        };
        let secret = non_empty(spec.secret)
            .unwrap_or_else(|| generate_secret(ProtocolKind::parse(&parent.protocol)));

        let now = Utc::now();
        let model = client::ActiveModel {
            inbound_id: Set(parent.id),
            user_id: Set(spec.user_id),
            email: Set(email.clone()),
            uuid_or_password: Set(secret),
            flow: Set(non_empty(spec.flow)),
            alter_id: Set(spec.alter_id),
            total_traffic: Set(spec.total_traffic),
            up_traffic: Set(0),
            down_traffic: Set(0),
            exp_time: Set(spec.exp_time),
            enable: Set(spec.enable.unwrap_or(true)),
            remark: Set(non_empty(spec.remark)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = model
            .insert(&self.db)
            .await
            .map_err(|e| conflict_or_db(e, || format!("email {} is already in use", email)))?;

        info!(
            inbound_id = parent.id,
            client_id = created.id,
            email = %created.email,
            "Client created"
        );

        let sync = if parent.enable && created.enable {
            self.propagate(parent.node_id, add_client(&parent, &created))
                .await
        } else {
            SyncOutcome::Skipped
        };

        Ok(Applied::new(created, sync))
    }

    /// Change a client's credentials or limits
    pub async fn update_client(
        &self,
        client_id: i64,
        patch: ClientPatch,
    ) -> ControlResult<Applied<client::Model>> {
        if patch.total_traffic.is_some_and(|t| t < 0) {
            return Err(ControlError::validation("total traffic cannot be negative"));
        }

        let existing = self.find_client(client_id).await?;
        let parent = self.find_inbound(existing.inbound_id).await?;

        let mut active: client::ActiveModel = existing.into();
        if let Some(secret) = non_empty(patch.secret) {
            active.uuid_or_password = Set(secret);
        }
        if let Some(flow) = patch.flow {
            active.flow = Set(non_empty(Some(flow)));
        }
        if let Some(alter_id) = patch.alter_id {
            active.alter_id = Set(alter_id);
        }
        if let Some(total) = patch.total_traffic {
            active.total_traffic = Set(total);
        }
        if let Some(exp_time) = patch.exp_time {
            active.exp_time = Set(Some(exp_time));
        }
        if let Some(remark) = patch.remark {
            active.remark = Set(non_empty(Some(remark)));
        }
        if let Some(enable) = patch.enable {
            active.enable = Set(enable);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        info!(client_id, enable = ?patch.enable, "Client updated");

        let sync = match patch.enable {
            Some(_) if !parent.enable => SyncOutcome::Skipped,
            Some(true) => {
                self.propagate(parent.node_id, add_client(&parent, &updated))
                    .await
            }
            Some(false) => {
                self.propagate(parent.node_id, remove_client(&parent, &updated))
                    .await
            }
            None => SyncOutcome::Skipped,
        };

        Ok(Applied::new(updated, sync))
    }

    /// Delete a client and remove it from its inbound on the node
    pub async fn delete_client(&self, client_id: i64) -> ControlResult<Applied<client::Model>> {
        let existing = self.find_client(client_id).await?;
        let parent = self.find_inbound(existing.inbound_id).await?;

        client::Entity::delete_by_id(client_id)
            .exec(&self.db)
            .await?;

        info!(client_id, email = %existing.email, "Client deleted");

        let sync = if parent.enable {
            self.propagate(parent.node_id, remove_client(&parent, &existing))
                .await
        } else {
            SyncOutcome::Skipped
        };

        Ok(Applied::new(existing, sync))
    }

    /// Clients, optionally of one inbound, ordered by id
    pub async fn list_clients(&self, inbound_id: Option<i64>) -> ControlResult<Vec<client::Model>> {
        let mut query = client::Entity::find().order_by_asc(client::Column::Id);
        if let Some(inbound_id) = inbound_id {
            query = query.filter(client::Column::InboundId.eq(inbound_id));
        }
        Ok(query.all(&self.db).await?)
    }

    /// Zero both traffic counters; every other column is left untouched
    pub async fn reset_client_traffic(&self, client_id: i64) -> ControlResult<client::Model> {
        let existing = self.find_client(client_id).await?;

        let mut active: client::ActiveModel = existing.into();
        active.up_traffic = Set(0);
        active.down_traffic = Set(0);
        let updated = active.update(&self.db).await?;

        info!(client_id, "Client traffic reset");
        Ok(updated)
    }

    /// Subscription link for one client
    pub async fn client_link(&self, client_id: i64) -> ControlResult<String> {
        let client = self.find_client(client_id).await?;
        let parent = self.find_inbound(client.inbound_id).await?;
        let node = self.find_node(parent.node_id).await?;

        link::client_link(&client, &parent, &node).ok_or_else(|| {
            ControlError::validation(format!(
                "protocol {} has no subscription link",
                parent.protocol
            ))
        })
    }

    async fn email_taken(&self, email: &str) -> ControlResult<bool> {
        let count = client::Entity::find()
            .filter(client::Column::Email.eq(email))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn generate_email(&self, user_id: Option<i64>) -> ControlResult<String> {
        let base = format!(
            "{}_{}",
            user_id.unwrap_or_default(),
            Utc::now().timestamp_millis()
        );

        let mut candidate = format!("{}@{}", base, EMAIL_DOMAIN);
        let mut suffix = 1;
        while self.email_taken(&candidate).await? {
            candidate = format!("{}_{}@{}", base, suffix, EMAIL_DOMAIN);
            suffix += 1;
        }
        Ok(candidate)
    }
}

fn generate_secret(protocol: ProtocolKind) -> String {
    match protocol {
        ProtocolKind::Shadowsocks => Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SHADOWSOCKS_PASSWORD_LEN)
            .collect(),
        _ => Uuid::new_v4().to_string(),
    }
}

pub(super) fn add_client(parent: &inbound::Model, client: &client::Model) -> Command {
    Command::AddClient(ClientDescriptor {
        inbound_tag: parent.tag.clone(),
        email: client.email.clone(),
        secret: client.uuid_or_password.clone(),
        flow: client.flow.clone().unwrap_or_default(),
        alter_id: client.alter_id,
        protocol: parent.protocol.clone(),
    })
}

pub(super) fn remove_client(parent: &inbound::Model, client: &client::Model) -> Command {
    Command::RemoveClient(RemoveClientPayload {
        inbound_tag: parent.tag.clone(),
        email: client.email.clone(),
    })
}
