//! User entity carrying quota and account-level traffic counters

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Login name (unique)
    #[sea_orm(unique)]
    pub name: String,

    /// Quota in GiB
    pub flow: i64,

    /// Downloaded bytes accounted to the user
    pub in_flow: i64,

    /// Uploaded bytes accounted to the user
    pub out_flow: i64,

    /// Expiry as unix milliseconds
    pub exp_time: i64,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// User owns clients
    #[sea_orm(has_many = "super::client::Entity")]
    Clients,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Clients.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
