//! Storage for nodes, inbounds, clients, certificates and users
//!
//! Thin sea-orm layer: entities, migrations, and the two helpers every
//! process calls at startup.

pub mod entities;
pub mod migrator;

pub use migrator::Migrator;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::debug;

/// Open a connection pool for `url` (`sqlite://...`, `sqlite::memory:`, `postgres://...`)
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(url.to_string());
    options.sqlx_logging(false);

    // Every pooled connection to an in-memory database is a separate database
    if url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }

    debug!("Connecting to database");
    Database::connect(options).await
}

/// Apply all pending migrations
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    Migrator::up(db, None).await
}
