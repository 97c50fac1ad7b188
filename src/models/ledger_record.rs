//! Ledger record entity
//!
//! Row shape behind [`crate::ledger::SeaOrmLedger`]. Kind-specific attributes
//! live in the `fields` JSON column as [`crate::ledger::RecordFields`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub connection_id: Uuid,

    /// Local record kind, e.g. `partner`, `product`, `invoice`.
    pub kind: String,

    /// Remote entity name of the external reference (`Customer`, `Item`, ...).
    pub remote_type: Option<String>,

    /// Remote Id of the external reference.
    pub external_id: Option<String>,

    /// SKU for products, account number for accounts, document number for invoices.
    pub code: Option<String>,

    pub parent_id: Option<Uuid>,

    pub name: String,

    pub state: String,

    pub exported: bool,

    #[sea_orm(column_type = "JsonBinary")]
    pub fields: JsonValue,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
