//! Database migrations for the QuickBooks Online connector.

pub use sea_orm_migration::prelude::*;

mod m2025_12_01_000001_create_qbo_connections;
mod m2025_12_01_000002_create_oauth_states;
mod m2025_12_01_000003_create_import_cursors;
mod m2025_12_01_000004_create_ledger_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_12_01_000001_create_qbo_connections::Migration),
            Box::new(m2025_12_01_000002_create_oauth_states::Migration),
            Box::new(m2025_12_01_000003_create_import_cursors::Migration),
            Box::new(m2025_12_01_000004_create_ledger_records::Migration),
        ]
    }
}
