//! TlsCert entity for certificates deployed to nodes

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tls_certs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Node the certificate is deployed to
    pub node_id: i64,

    pub domain: String,

    /// Certificate chain in PEM format
    #[sea_orm(column_type = "Text", nullable)]
    pub public_key: Option<String>,

    /// Private key in PEM format
    #[sea_orm(column_type = "Text", nullable)]
    #[serde(skip_serializing)]
    pub private_key: Option<String>,

    pub auto_renew: bool,

    /// Expiry as unix milliseconds
    pub expire_time: Option<i64>,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    /// Both key halves are present, so the certificate can be deployed
    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.public_key) && filled(&self.private_key)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Certificate belongs to a node
    #[sea_orm(
        belongs_to = "super::node::Entity",
        from = "Column::NodeId",
        to = "super::node::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Node,
}

impl Related<super::node::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Node.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
