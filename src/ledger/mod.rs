//! # Host Ledger
//!
//! The connector never owns accounting rules. It talks to the ledger through
//! the narrow [`Ledger`] trait: lookups by external reference, create and
//! update, plus the few domain actions import needs (posting a payment,
//! setting stock on hand). [`SeaOrmLedger`] is the database-backed
//! implementation shipped with the service.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::SyncError;
use crate::qbo::RemoteEntity;

pub mod fields;
pub mod store;

pub use fields::*;
pub use store::SeaOrmLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Partner,
    Account,
    Journal,
    Tax,
    TaxAgency,
    PaymentTerm,
    PaymentMethod,
    ProductCategory,
    Product,
    Invoice,
    Payment,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Partner => "partner",
            RecordKind::Account => "account",
            RecordKind::Journal => "journal",
            RecordKind::Tax => "tax",
            RecordKind::TaxAgency => "tax_agency",
            RecordKind::PaymentTerm => "payment_term",
            RecordKind::PaymentMethod => "payment_method",
            RecordKind::ProductCategory => "product_category",
            RecordKind::Product => "product",
            RecordKind::Invoice => "invoice",
            RecordKind::Payment => "payment",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "partner" => RecordKind::Partner,
            "account" => RecordKind::Account,
            "journal" => RecordKind::Journal,
            "tax" => RecordKind::Tax,
            "tax_agency" => RecordKind::TaxAgency,
            "payment_term" => RecordKind::PaymentTerm,
            "payment_method" => RecordKind::PaymentMethod,
            "product_category" => RecordKind::ProductCategory,
            "product" => RecordKind::Product,
            "invoice" => RecordKind::Invoice,
            "payment" => RecordKind::Payment,
            other => return Err(SyncError::decode(format!("unknown record kind '{}'", other))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Draft,
    Open,
    Posted,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordState::Draft => "draft",
            RecordState::Open => "open",
            RecordState::Posted => "posted",
        }
    }
}

impl FromStr for RecordState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "draft" => RecordState::Draft,
            "open" => RecordState::Open,
            "posted" => RecordState::Posted,
            other => return Err(SyncError::decode(format!("unknown record state '{}'", other))),
        })
    }
}

/// Link from a local record to its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ExternalRef {
    pub remote: RemoteEntity,
    pub id: String,
}

impl ExternalRef {
    pub fn new(remote: RemoteEntity, id: impl Into<String>) -> Self {
        Self {
            remote,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub id: Uuid,
    pub external_ref: Option<ExternalRef>,
    /// SKU, account number or document number, depending on kind.
    pub code: Option<String>,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub state: RecordState,
    pub exported: bool,
    pub fields: RecordFields,
}

impl LedgerRecord {
    pub fn kind(&self) -> RecordKind {
        self.fields.kind()
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_ref.as_ref().map(|r| r.id.as_str())
    }
}

/// A record about to be created. Its kind follows from `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub external_ref: Option<ExternalRef>,
    pub code: Option<String>,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub state: RecordState,
    pub fields: RecordFields,
}

impl NewRecord {
    pub fn new(name: impl Into<String>, fields: RecordFields) -> Self {
        Self {
            external_ref: None,
            code: None,
            parent_id: None,
            name: name.into(),
            state: RecordState::Open,
            fields,
        }
    }

    pub fn with_external_ref(mut self, external_ref: ExternalRef) -> Self {
        self.external_ref = Some(external_ref);
        self
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<Uuid>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_state(mut self, state: RecordState) -> Self {
        self.state = state;
        self
    }
}

/// Reduces a lookup that must match at most one record.
pub fn expect_single(
    mut matches: Vec<LedgerRecord>,
    what: impl fmt::Display,
) -> Result<Option<LedgerRecord>, SyncError> {
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        n => Err(SyncError::integrity(format!(
            "expected at most one local record for {}, found {}",
            what, n
        ))),
    }
}

/// Ledger operations scoped to one connection.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn find_by_external_ref(
        &self,
        remote: RemoteEntity,
        id: &str,
    ) -> Result<Vec<LedgerRecord>, SyncError>;

    async fn find_by_code(&self, kind: RecordKind, code: &str)
    -> Result<Vec<LedgerRecord>, SyncError>;

    async fn find_by_name(&self, kind: RecordKind, name: &str)
    -> Result<Vec<LedgerRecord>, SyncError>;

    async fn find_children(
        &self,
        parent_id: Uuid,
        kind: RecordKind,
    ) -> Result<Vec<LedgerRecord>, SyncError>;

    async fn get(&self, id: Uuid) -> Result<Option<LedgerRecord>, SyncError>;

    async fn create(&self, record: NewRecord) -> Result<LedgerRecord, SyncError>;

    /// Writes every attribute of `record` over the stored row.
    async fn update(&self, record: &LedgerRecord) -> Result<(), SyncError>;

    async fn find_journal_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<LedgerRecord>, SyncError>;

    async fn post_payment(&self, payment_id: Uuid) -> Result<(), SyncError>;

    async fn adjust_stock_quantity(&self, product_id: Uuid, quantity: f64)
    -> Result<(), SyncError>;

    /// Stores the remote reference and flips the exported flag together.
    async fn mark_exported(&self, id: Uuid, external_ref: &ExternalRef) -> Result<(), SyncError>;

    async fn find_account_by_external_ref(
        &self,
        id: &str,
    ) -> Result<Option<LedgerRecord>, SyncError> {
        let matches = self.find_by_external_ref(RemoteEntity::Account, id).await?;
        expect_single(matches, format!("Account {}", id))
    }

    /// Loads a record that must exist.
    async fn require(&self, id: Uuid) -> Result<LedgerRecord, SyncError> {
        self.get(id)
            .await?
            .ok_or_else(|| SyncError::integrity(format!("local record {} does not exist", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tax_agency(name: &str) -> LedgerRecord {
        LedgerRecord {
            id: Uuid::new_v4(),
            external_ref: None,
            code: None,
            parent_id: None,
            name: name.to_string(),
            state: RecordState::Open,
            exported: false,
            fields: RecordFields::TaxAgency(TaxAgencyFields {}),
        }
    }

    #[test]
    fn expect_single_rejects_duplicates() {
        assert!(expect_single(vec![], "x").unwrap().is_none());
        assert_eq!(
            expect_single(vec![tax_agency("a")], "x").unwrap().unwrap().name,
            "a"
        );
        let err = expect_single(vec![tax_agency("a"), tax_agency("b")], "Item 7").unwrap_err();
        assert!(matches!(err, SyncError::Integrity { .. }));
        assert!(err.to_string().contains("Item 7"));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [RecordKind::TaxAgency, RecordKind::ProductCategory, RecordKind::Payment] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
    }
}
