//! Client entity: a per-user credential bound to one inbound

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Parent inbound
    pub inbound_id: i64,

    /// Owning user, if any
    pub user_id: Option<i64>,

    /// Synthesised identifier the agent keys the credential by (unique)
    #[sea_orm(unique)]
    pub email: String,

    /// UUID or password, depending on the inbound's protocol
    pub uuid_or_password: String,

    /// Flow-control tag (vless)
    pub flow: Option<String>,

    /// Legacy vmess parameter
    pub alter_id: i32,

    /// Quota in bytes, 0 for unlimited
    pub total_traffic: i64,

    /// Uploaded bytes
    pub up_traffic: i64,

    /// Downloaded bytes
    pub down_traffic: i64,

    /// Expiry as unix milliseconds
    pub exp_time: Option<i64>,

    pub enable: bool,

    pub remark: Option<String>,

    pub created_at: ChronoDateTimeUtc,

    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    /// Whether the client has used up a non-zero quota
    pub fn over_quota(&self) -> bool {
        self.total_traffic > 0
            && self.up_traffic.saturating_add(self.down_traffic) >= self.total_traffic
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Client belongs to an inbound
    #[sea_orm(
        belongs_to = "super::inbound::Entity",
        from = "Column::InboundId",
        to = "super::inbound::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Inbound,

    /// Client may belong to a user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::inbound::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inbound.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
