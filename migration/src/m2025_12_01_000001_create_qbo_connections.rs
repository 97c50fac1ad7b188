//! Migration to create the qbo_connections table.
//!
//! One row per QuickBooks company: OAuth client credentials, endpoints,
//! realm, and sealed token material with expiry instants.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QboConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QboConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QboConnections::DisplayName).text().not_null())
                    .col(ColumnDef::new(QboConnections::ClientId).text().not_null())
                    .col(
                        ColumnDef::new(QboConnections::ClientSecretCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QboConnections::AuthorizationEndpoint)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(QboConnections::TokenEndpoint).text().not_null())
                    .col(ColumnDef::new(QboConnections::RedirectUri).text().not_null())
                    .col(ColumnDef::new(QboConnections::ApiBaseUrl).text().not_null())
                    .col(ColumnDef::new(QboConnections::RealmId).text().null())
                    .col(ColumnDef::new(QboConnections::AuthCode).text().null())
                    .col(
                        ColumnDef::new(QboConnections::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(QboConnections::AccessTokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(QboConnections::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(QboConnections::RefreshTokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(QboConnections::MinorVersion)
                            .text()
                            .not_null()
                            .default("8"),
                    )
                    .col(
                        ColumnDef::new(QboConnections::ExportMinorVersion)
                            .text()
                            .not_null()
                            .default("12"),
                    )
                    .col(ColumnDef::new(QboConnections::CountryCode).text().null())
                    .col(
                        ColumnDef::new(QboConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(QboConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_qbo_connections_realm_id")
                    .table(QboConnections::Table)
                    .col(QboConnections::RealmId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_qbo_connections_realm_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(QboConnections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum QboConnections {
    Table,
    Id,
    DisplayName,
    ClientId,
    ClientSecretCiphertext,
    AuthorizationEndpoint,
    TokenEndpoint,
    RedirectUri,
    ApiBaseUrl,
    RealmId,
    AuthCode,
    AccessTokenCiphertext,
    AccessTokenExpiresAt,
    RefreshTokenCiphertext,
    RefreshTokenExpiresAt,
    MinorVersion,
    ExportMinorVersion,
    CountryCode,
    CreatedAt,
    UpdatedAt,
}
