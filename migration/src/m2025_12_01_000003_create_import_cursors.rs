//! Migration to create the import_cursors table.
//!
//! One watermark per (connection, import stream).

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
                    .table(ImportCursors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImportCursors::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImportCursors::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(ImportCursors::Stream).text().not_null())
                    .col(
                        ColumnDef::new(ImportCursors::LastImportedId)
                            .text()
                            .not_null()
                            .default("0"),
                    )
                    .col(
                        ColumnDef::new(ImportCursors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_import_cursors_connection_id")
                            .from(ImportCursors::Table, ImportCursors::ConnectionId)
                            .to(QboConnections::Table, QboConnections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_import_cursors_connection_stream")
                    .table(ImportCursors::Table)
                    .col(ImportCursors::ConnectionId)
                    .col(ImportCursors::Stream)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_import_cursors_connection_stream")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ImportCursors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImportCursors {
    Table,
    Id,
    ConnectionId,
    Stream,
    LastImportedId,
    UpdatedAt,
}
