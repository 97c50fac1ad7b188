//! SeaORM-backed [`Ledger`] over the `ledger_records` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;
use uuid::Uuid;

use super::{
    ExternalRef, Ledger, LedgerRecord, NewRecord, RecordFields, RecordKind, RecordState,
};
use crate::error::SyncError;
use crate::models::ledger_record::{self, ActiveModel, Entity, Model};
use crate::qbo::RemoteEntity;

#[derive(Clone)]
pub struct SeaOrmLedger {
    db: Arc<DatabaseConnection>,
    connection_id: Uuid,
}

impl SeaOrmLedger {
    pub fn new(db: Arc<DatabaseConnection>, connection_id: Uuid) -> Self {
        Self { db, connection_id }
    }

    /// All records of one kind, oldest first.
    pub async fn list(&self, kind: RecordKind) -> Result<Vec<LedgerRecord>, SyncError> {
        self.select(ledger_record::Column::Kind.eq(kind.as_str()))
            .await
    }

    async fn select(
        &self,
        condition: sea_orm::sea_query::SimpleExpr,
    ) -> Result<Vec<LedgerRecord>, SyncError> {
        Entity::find()
            .filter(ledger_record::Column::ConnectionId.eq(self.connection_id))
            .filter(condition)
            .order_by_asc(ledger_record::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn find_model(&self, id: Uuid) -> Result<Option<Model>, SyncError> {
        Ok(Entity::find_by_id(id)
            .filter(ledger_record::Column::ConnectionId.eq(self.connection_id))
            .one(&*self.db)
            .await?)
    }
}

fn to_record(model: Model) -> Result<LedgerRecord, SyncError> {
    let fields: RecordFields = serde_json::from_value(model.fields).map_err(|e| {
        SyncError::decode(format!("ledger record {} has corrupt fields: {}", model.id, e))
    })?;
    let external_ref = match (model.remote_type, model.external_id) {
        (Some(remote), Some(id)) => {
            let remote = remote
                .parse::<RemoteEntity>()
                .map_err(|e| SyncError::decode(e.to_string()))?;
            Some(ExternalRef { remote, id })
        }
        _ => None,
    };
    Ok(LedgerRecord {
        id: model.id,
        external_ref,
        code: model.code,
        parent_id: model.parent_id,
        name: model.name,
        state: model.state.parse()?,
        exported: model.exported,
        fields,
    })
}

fn fields_json(fields: &RecordFields) -> Result<serde_json::Value, SyncError> {
    serde_json::to_value(fields)
        .map_err(|e| SyncError::decode(format!("unserializable record fields: {}", e)))
}

#[async_trait]
impl Ledger for SeaOrmLedger {
    async fn find_by_external_ref(
        &self,
        remote: RemoteEntity,
        id: &str,
    ) -> Result<Vec<LedgerRecord>, SyncError> {
        self.select(
            ledger_record::Column::RemoteType
                .eq(remote.name())
                .and(ledger_record::Column::ExternalId.eq(id)),
        )
        .await
    }

    async fn find_by_code(
        &self,
        kind: RecordKind,
        code: &str,
    ) -> Result<Vec<LedgerRecord>, SyncError> {
        self.select(
            ledger_record::Column::Kind
                .eq(kind.as_str())
                .and(ledger_record::Column::Code.eq(code)),
        )
        .await
    }

    async fn find_by_name(
        &self,
        kind: RecordKind,
        name: &str,
    ) -> Result<Vec<LedgerRecord>, SyncError> {
        self.select(
            ledger_record::Column::Kind
                .eq(kind.as_str())
                .and(ledger_record::Column::Name.eq(name)),
        )
        .await
    }

    async fn find_children(
        &self,
        parent_id: Uuid,
        kind: RecordKind,
    ) -> Result<Vec<LedgerRecord>, SyncError> {
        self.select(
            ledger_record::Column::Kind
                .eq(kind.as_str())
                .and(ledger_record::Column::ParentId.eq(parent_id)),
        )
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<LedgerRecord>, SyncError> {
        self.find_model(id).await?.map(to_record).transpose()
    }

    async fn create(&self, record: NewRecord) -> Result<LedgerRecord, SyncError> {
        let now = Utc::now().fixed_offset();
        let kind = record.fields.kind();
        let (remote_type, external_id) = match &record.external_ref {
            Some(r) => (Some(r.remote.name().to_string()), Some(r.id.clone())),
            None => (None, None),
        };
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            connection_id: Set(self.connection_id),
            kind: Set(kind.as_str().to_string()),
            remote_type: Set(remote_type),
            external_id: Set(external_id),
            code: Set(record.code),
            parent_id: Set(record.parent_id),
            name: Set(record.name),
            state: Set(record.state.as_str().to_string()),
            exported: Set(false),
            fields: Set(fields_json(&record.fields)?),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        debug!(record_id = %model.id, kind = %kind, "created ledger record");
        to_record(model)
    }

    async fn update(&self, record: &LedgerRecord) -> Result<(), SyncError> {
        let (remote_type, external_id) = match &record.external_ref {
            Some(r) => (Some(r.remote.name().to_string()), Some(r.id.clone())),
            None => (None, None),
        };
        ActiveModel {
            id: Set(record.id),
            kind: Set(record.kind().as_str().to_string()),
            remote_type: Set(remote_type),
            external_id: Set(external_id),
            code: Set(record.code.clone()),
            parent_id: Set(record.parent_id),
            name: Set(record.name.clone()),
            state: Set(record.state.as_str().to_string()),
            exported: Set(record.exported),
            fields: Set(fields_json(&record.fields)?),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    async fn find_journal_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<LedgerRecord>, SyncError> {
        let journals = self.list(RecordKind::Journal).await?;
        Ok(journals.into_iter().find(|journal| {
            matches!(
                &journal.fields,
                RecordFields::Journal(fields) if fields.default_account_id == Some(account_id)
            )
        }))
    }

    async fn post_payment(&self, payment_id: Uuid) -> Result<(), SyncError> {
        let mut payment = self.require(payment_id).await?;
        let RecordFields::Payment(fields) = &mut payment.fields else {
            return Err(SyncError::integrity(format!(
                "record {} is a {}, not a payment",
                payment_id,
                payment.kind()
            )));
        };
        fields.posted = true;
        payment.state = RecordState::Posted;
        self.update(&payment).await
    }

    async fn adjust_stock_quantity(
        &self,
        product_id: Uuid,
        quantity: f64,
    ) -> Result<(), SyncError> {
        let mut product = self.require(product_id).await?;
        let RecordFields::Product(fields) = &mut product.fields else {
            return Err(SyncError::integrity(format!(
                "record {} is a {}, not a product",
                product_id,
                product.kind()
            )));
        };
        fields.qty_on_hand = quantity;
        self.update(&product).await
    }

    async fn mark_exported(&self, id: Uuid, external_ref: &ExternalRef) -> Result<(), SyncError> {
        ActiveModel {
            id: Set(id),
            remote_type: Set(Some(external_ref.remote.name().to_string())),
            external_id: Set(Some(external_ref.id.clone())),
            exported: Set(true),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }
}
