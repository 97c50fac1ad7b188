//! Migration to create the ledger_records table.
//!
//! Backing store for the local ledger side of the sync: partners, products,
//! accounts, documents and payments keyed by kind, with their remote
//! references and a JSON bag of typed fields.

use sea_orm_migration::prelude::*;

use crate::m2025_12_01_000001_create_qbo_connections::QboConnections;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LedgerRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LedgerRecords::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(LedgerRecords::Kind).text().not_null())
                    .col(ColumnDef::new(LedgerRecords::RemoteType).text().null())
                    .col(ColumnDef::new(LedgerRecords::ExternalId).text().null())
                    .col(ColumnDef::new(LedgerRecords::Code).text().null())
                    .col(ColumnDef::new(LedgerRecords::ParentId).uuid().null())
                    .col(ColumnDef::new(LedgerRecords::Name).text().not_null())
                    .col(
                        ColumnDef::new(LedgerRecords::State)
                            .text()
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(LedgerRecords::Exported)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(LedgerRecords::Fields).json_binary().not_null())
                    .col(
                        ColumnDef::new(LedgerRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(LedgerRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ledger_records_connection_id")
                            .from(LedgerRecords::Table, LedgerRecords::ConnectionId)
                            .to(QboConnections::Table, QboConnections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Not unique: duplicates must be detectable and reported, not rejected by the store.
        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_records_external_ref")
                    .table(LedgerRecords::Table)
                    .col(LedgerRecords::ConnectionId)
                    .col(LedgerRecords::RemoteType)
                    .col(LedgerRecords::ExternalId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_records_kind_code")
                    .table(LedgerRecords::Table)
                    .col(LedgerRecords::ConnectionId)
                    .col(LedgerRecords::Kind)
                    .col(LedgerRecords::Code)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_ledger_records_kind_code").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_ledger_records_external_ref").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LedgerRecords {
    Table,
    Id,
    ConnectionId,
    Kind,
    RemoteType,
    ExternalId,
    Code,
    ParentId,
    Name,
    State,
    Exported,
    Fields,
    CreatedAt,
    UpdatedAt,
}
