//! Initial schema: users, nodes, inbounds, clients, tls_certs

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // 1. Create users table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(User::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_len(User::Name, 255).unique_key())
                    .col(big_integer(User::Flow).default(0))
                    .col(big_integer(User::InFlow).default(0))
                    .col(big_integer(User::OutFlow).default(0))
                    .col(big_integer(User::ExpTime).default(0))
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 2. Create nodes table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Node::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Node::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_len(Node::Name, 255))
                    .col(string_len(Node::Secret, 255))
                    .col(string_len(Node::ServerIp, 255))
                    .col(ColumnDef::new(Node::Version).string_len(64).null())
                    .col(string_len(Node::Status, 32).default("active"))
                    .col(
                        timestamp_with_time_zone(Node::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 3. Create inbounds table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Inbound::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Inbound::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(Inbound::NodeId))
                    .col(string_len(Inbound::Tag, 255))
                    .col(string_len(Inbound::Protocol, 32))
                    .col(string_len(Inbound::Listen, 255).default("0.0.0.0"))
                    .col(integer(Inbound::Port))
                    .col(text(Inbound::SettingsJson))
                    .col(text(Inbound::StreamSettingsJson))
                    .col(text(Inbound::SniffingJson))
                    .col(ColumnDef::new(Inbound::Remark).string_len(255).null())
                    .col(boolean(Inbound::Enable).default(true))
                    .col(
                        timestamp_with_time_zone(Inbound::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Inbound::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_inbounds_node_id")
                            .from(Inbound::Table, Inbound::NodeId)
                            .to(Node::Table, Node::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_inbounds_node_port")
                    .table(Inbound::Table)
                    .col(Inbound::NodeId)
                    .col(Inbound::Port)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_inbounds_node_tag")
                    .table(Inbound::Table)
                    .col(Inbound::NodeId)
                    .col(Inbound::Tag)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 4. Create clients table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Client::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(Client::InboundId))
                    .col(ColumnDef::new(Client::UserId).big_integer().null())
                    .col(string_len(Client::Email, 255).unique_key())
                    .col(string_len(Client::UuidOrPassword, 255))
                    .col(ColumnDef::new(Client::Flow).string_len(64).null())
                    .col(integer(Client::AlterId).default(0))
                    .col(big_integer(Client::TotalTraffic).default(0))
                    .col(big_integer(Client::UpTraffic).default(0))
                    .col(big_integer(Client::DownTraffic).default(0))
                    .col(ColumnDef::new(Client::ExpTime).big_integer().null())
                    .col(boolean(Client::Enable).default(true))
                    .col(ColumnDef::new(Client::Remark).string_len(255).null())
                    .col(
                        timestamp_with_time_zone(Client::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Client::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_clients_inbound_id")
                            .from(Client::Table, Client::InboundId)
                            .to(Inbound::Table, Inbound::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_clients_inbound_id")
                    .table(Client::Table)
                    .col(Client::InboundId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_clients_user_id")
                    .table(Client::Table)
                    .col(Client::UserId)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // 5. Create tls_certs table
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(TlsCert::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TlsCert::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(big_integer(TlsCert::NodeId))
                    .col(string_len(TlsCert::Domain, 255))
                    .col(ColumnDef::new(TlsCert::PublicKey).text().null())
                    .col(ColumnDef::new(TlsCert::PrivateKey).text().null())
                    .col(boolean(TlsCert::AutoRenew).default(false))
                    .col(ColumnDef::new(TlsCert::ExpireTime).big_integer().null())
                    .col(
                        timestamp_with_time_zone(TlsCert::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(TlsCert::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tls_certs_node_id")
                            .from(TlsCert::Table, TlsCert::NodeId)
                            .to(Node::Table, Node::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tls_certs_node_id")
                    .table(TlsCert::Table)
                    .col(TlsCert::NodeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TlsCert::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Client::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Inbound::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Node::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Name,
    Flow,
    InFlow,
    OutFlow,
    ExpTime,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Node {
    #[sea_orm(iden = "nodes")]
    Table,
    Id,
    Name,
    Secret,
    ServerIp,
    Version,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Inbound {
    #[sea_orm(iden = "inbounds")]
    Table,
    Id,
    NodeId,
    Tag,
    Protocol,
    Listen,
    Port,
    SettingsJson,
    StreamSettingsJson,
    SniffingJson,
    Remark,
    Enable,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Client {
    #[sea_orm(iden = "clients")]
    Table,
    Id,
    InboundId,
    UserId,
    Email,
    UuidOrPassword,
    Flow,
    AlterId,
    TotalTraffic,
    UpTraffic,
    DownTraffic,
    ExpTime,
    Enable,
    Remark,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TlsCert {
    #[sea_orm(iden = "tls_certs")]
    Table,
    Id,
    NodeId,
    Domain,
    PublicKey,
    PrivateKey,
    AutoRenew,
    ExpireTime,
    CreatedAt,
    UpdatedAt,
}
