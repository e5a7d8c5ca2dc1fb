//! Inbound entity: one configured listener on a node

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inbounds")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Owning node
    pub node_id: i64,

    /// Listener tag, unique per node
    pub tag: String,

    /// Protocol name (vmess, vless, trojan, shadowsocks, ...)
    pub protocol: String,

    /// Bind address
    pub listen: String,

    /// Listening port, unique per node
    pub port: i32,

    /// Protocol settings document (JSON text)
    #[sea_orm(column_type = "Text")]
    pub settings_json: String,

    /// Stream transport settings document (JSON text)
    #[sea_orm(column_type = "Text")]
    pub stream_settings_json: String,

    /// Sniffing settings document (JSON text)
    #[sea_orm(column_type = "Text")]
    pub sniffing_json: String,

    pub remark: Option<String>,

    /// Whether the inbound belongs to the node's live configuration
    pub enable: bool,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Inbound belongs to a node
    #[sea_orm(
        belongs_to = "super::node::Entity",
        from = "Column::NodeId",
        to = "super::node::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Node,

    /// Inbound owns clients
    #[sea_orm(has_many = "super::client::Entity")]
    Clients,
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Node.def()
    }
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Clients.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
