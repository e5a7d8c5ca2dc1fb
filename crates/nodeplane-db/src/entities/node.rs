//! Node entity for remote relay agents

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Operational status set by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum NodeStatus {
    /// Node serves traffic and appears in subscriptions
    #[sea_orm(string_value = "active")]
    Active,

    /// Node is kept but hidden from subscriptions
    #[sea_orm(string_value = "disabled")]
    Disabled,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Display name, shown next to subscription links
    pub name: String,

    /// Shared secret the agent presents when dialing in
    #[serde(skip_serializing)]
    pub secret: String,

    /// Public address clients connect to
    pub server_ip: String,

    /// Agent version reported on the last connect
    pub version: Option<String>,

    pub status: NodeStatus,

    pub created_at: ChronoDateTimeUtc,
}

impl Model {
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Node hosts inbounds
    #[sea_orm(has_many = "super::inbound::Entity")]
    Inbounds,

    /// Node holds certificates
    #[sea_orm(has_many = "super::tls_cert::Entity")]
    TlsCerts,
}

impl Related<super::inbound::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inbounds.def()
    }
}

impl Related<super::tls_cert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TlsCerts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
