//! # Export Engine
//!
//! Pushes local records to the remote. Master records (products, partners,
//! payment methods) are created once and sparse-updated afterwards with a
//! freshly read sync token. Invoices and bills are single-shot: once a
//! document carries an external reference it is never sent again.
//!
//! Every referenced record must already be exported; the payload is built
//! completely before the single remote call, and the local record is marked
//! exported only after that call succeeds.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::resolver::ReferenceResolver;
use crate::error::SyncError;
use crate::ledger::{
    AddressType, ExternalRef, InvoiceDirection, InvoiceFields, Ledger, LedgerRecord,
    PartnerFields, PartnerRole, PaymentMethodFields, ProductFields, ProductType, RecordFields,
    RecordKind, RecordState, expect_single,
};
use crate::qbo::payload::{
    AddressPayload, CreatePayload, DocumentLine, DocumentPayload, EmailPayload, ItemCreate,
    ItemType, ItemUpdate, LineDetail, LineDetailType, PartnerPayload, PaymentMethodPayload,
    PhonePayload, RefValue, UpdateFields, WebPayload,
};
use crate::qbo::{Connection, QboClient, RemoteEntity};

/// Local account every stock product posts its inventory value to.
pub const INVENTORY_ASSET_ACCOUNT: &str = "Inventory Asset";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExportOutcome {
    Created { external_id: String },
    Updated { external_id: String },
}

impl ExportOutcome {
    pub fn external_id(&self) -> &str {
        match self {
            ExportOutcome::Created { external_id } | ExportOutcome::Updated { external_id } => {
                external_id
            }
        }
    }
}

enum Plan {
    Create(CreatePayload),
    Update {
        external_id: String,
        fields: UpdateFields,
    },
}

fn response_id(entity: RemoteEntity, value: &Value) -> Result<String, SyncError> {
    match value.get("Id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(SyncError::decode(format!(
            "{} create response carries no Id",
            entity
        ))),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

pub struct ExportEngine {
    ledger: Arc<dyn Ledger>,
    client: Arc<QboClient>,
    resolver: ReferenceResolver,
}

impl ExportEngine {
    pub fn new(ledger: Arc<dyn Ledger>, client: Arc<QboClient>, resolver: ReferenceResolver) -> Self {
        Self {
            ledger,
            client,
            resolver,
        }
    }

    fn connection(&self) -> &Connection {
        self.resolver.connection()
    }

    #[instrument(skip_all, fields(record_id = %record.id, kind = %record.kind()))]
    pub async fn export(&self, record: &LedgerRecord) -> Result<ExportOutcome, SyncError> {
        let plan = match &record.fields {
            RecordFields::Invoice(fields) => self.plan_document(record, fields).await?,
            RecordFields::Product(fields) => self.plan_product(record, fields).await?,
            RecordFields::Partner(fields) => self.plan_partner(record, fields).await?,
            RecordFields::PaymentMethod(fields) => self.plan_payment_method(record, fields),
            _ => {
                return Err(SyncError::not_exported(format!(
                    "{} records cannot be exported",
                    record.kind()
                )));
            }
        };

        let result = self.execute(record, plan).await;
        let label = match &result {
            Ok(ExportOutcome::Created { .. }) => "created",
            Ok(ExportOutcome::Updated { .. }) => "updated",
            Err(_) => "failed",
        };
        counter!("qbo_exports_total", "kind" => record.kind().as_str(), "outcome" => label)
            .increment(1);
        result
    }

    async fn execute(&self, record: &LedgerRecord, plan: Plan) -> Result<ExportOutcome, SyncError> {
        let connection = self.connection();
        let outcome = match plan {
            Plan::Create(payload) => {
                let entity = payload.entity();
                let created = self.client.create(connection, &payload).await?;
                let external_id = response_id(entity, &created)?;
                self.ledger
                    .mark_exported(record.id, &ExternalRef::new(entity, &external_id))
                    .await?;
                ExportOutcome::Created { external_id }
            }
            Plan::Update {
                external_id,
                fields,
            } => {
                let entity = fields.entity();
                let sync_token = self
                    .client
                    .fetch_sync_token(connection, entity, &external_id)
                    .await?;
                self.client
                    .update(connection, &external_id, &sync_token, &fields)
                    .await?;
                self.ledger
                    .mark_exported(record.id, &ExternalRef::new(entity, &external_id))
                    .await?;
                ExportOutcome::Updated { external_id }
            }
        };
        info!(
            record_id = %record.id,
            external_id = %outcome.external_id(),
            "exported record"
        );
        Ok(outcome)
    }

    async fn plan_document(
        &self,
        record: &LedgerRecord,
        fields: &InvoiceFields,
    ) -> Result<Plan, SyncError> {
        if record.exported || record.external_ref.is_some() {
            return Err(SyncError::not_exported(format!(
                "{} is already exported",
                record.name
            )));
        }
        if !matches!(record.state, RecordState::Open | RecordState::Posted) {
            return Err(SyncError::not_exported(format!(
                "{} must be open or posted before export",
                record.name
            )));
        }

        let partner = RefValue::new(
            self.resolver
                .require_external_id(fields.partner_id, "Partner")
                .await?,
        );
        let detail_type = match fields.direction {
            InvoiceDirection::CustomerInvoice => LineDetailType::SalesItemLineDetail,
            InvoiceDirection::VendorBill => LineDetailType::ItemBasedExpenseLineDetail,
        };
        let us_company = self.connection().is_us_company();

        let mut lines = Vec::with_capacity(fields.lines.len());
        for line in &fields.lines {
            let item = self
                .resolver
                .require_external_id(line.product_id, "Product")
                .await?;
            let tax_code_ref = if us_company {
                Some(RefValue::new(if line.tax_ids.is_empty() { "NON" } else { "TAX" }))
            } else {
                match line.tax_ids.first() {
                    Some(tax_id) => Some(RefValue::new(
                        self.resolver.require_external_id(*tax_id, "Tax").await?,
                    )),
                    None => None,
                }
            };
            lines.push(DocumentLine::new(
                detail_type,
                line.description.clone(),
                line.subtotal,
                LineDetail {
                    item_ref: RefValue::new(item),
                    tax_code_ref,
                    unit_price: line.unit_price,
                    qty: line.quantity,
                },
            ));
        }

        let (customer_ref, vendor_ref) = match fields.direction {
            InvoiceDirection::CustomerInvoice => (Some(partner), None),
            InvoiceDirection::VendorBill => (None, Some(partner)),
        };
        let document = DocumentPayload {
            doc_number: record.code.clone().or_else(|| Some(record.name.clone())),
            txn_date: fields.date.map(|d| d.to_string()),
            due_date: fields.due_date.map(|d| d.to_string()),
            customer_ref,
            vendor_ref,
            line: lines,
        };
        Ok(Plan::Create(match fields.direction {
            InvoiceDirection::CustomerInvoice => CreatePayload::Invoice(document),
            InvoiceDirection::VendorBill => CreatePayload::Bill(document),
        }))
    }

    async fn required_account(
        &self,
        account_id: Option<Uuid>,
        what: &str,
        product: &str,
    ) -> Result<RefValue, SyncError> {
        let account_id = account_id.ok_or_else(|| {
            SyncError::not_exported(format!("{} account is required for product {}", what, product))
        })?;
        Ok(RefValue::new(
            self.resolver
                .require_external_id(account_id, &format!("{} account", what))
                .await?,
        ))
    }

    async fn plan_product(
        &self,
        record: &LedgerRecord,
        fields: &ProductFields,
    ) -> Result<Plan, SyncError> {
        let income = self
            .required_account(fields.income_account_id, "Income", &record.name)
            .await?;
        let expense = self
            .required_account(fields.expense_account_id, "Expense", &record.name)
            .await?;

        let mut create = ItemCreate {
            name: record.name.clone(),
            item_type: match fields.product_type {
                ProductType::Service => ItemType::Service,
                ProductType::Stock => ItemType::Inventory,
                ProductType::Consumable => ItemType::NonInventory,
            },
            income_account_ref: income,
            expense_account_ref: expense,
            unit_price: fields.list_price,
            inv_start_date: Utc::now().date_naive().to_string(),
            purchase_cost: fields.cost,
            description: non_empty(&fields.description),
            sku: non_empty(&record.code),
            purchase_desc: non_empty(&fields.purchase_description),
            qty_on_hand: None,
            track_qty_on_hand: None,
            asset_account_ref: None,
            sub_item: None,
            parent_ref: None,
        };

        if let Some(category_id) = record.parent_id {
            let category = self.ledger.require(category_id).await?;
            if let Some(category_ref) = category.external_id() {
                create.sub_item = Some(true);
                create.parent_ref = Some(RefValue::new(category_ref));
            }
        }

        if let Some(external_id) = record.external_id() {
            return Ok(Plan::Update {
                external_id: external_id.to_string(),
                fields: UpdateFields::Item(ItemUpdate::from(&create)),
            });
        }

        // Stock settings only travel with the create call.
        if fields.product_type == ProductType::Stock {
            let asset = expect_single(
                self.ledger
                    .find_by_name(RecordKind::Account, INVENTORY_ASSET_ACCOUNT)
                    .await?,
                format!("account named '{}'", INVENTORY_ASSET_ACCOUNT),
            )?
            .ok_or_else(|| {
                SyncError::not_exported(format!(
                    "local account '{}' is required for stock products",
                    INVENTORY_ASSET_ACCOUNT
                ))
            })?;
            create.qty_on_hand = Some(fields.qty_on_hand);
            create.track_qty_on_hand = Some(true);
            create.asset_account_ref = Some(RefValue::new(
                self.resolver
                    .require_external_id(asset.id, "Inventory Asset account")
                    .await?,
            ));
        }

        Ok(Plan::Create(CreatePayload::Item(create)))
    }

    async fn plan_partner(
        &self,
        record: &LedgerRecord,
        fields: &PartnerFields,
    ) -> Result<Plan, SyncError> {
        if fields.address_type != AddressType::Contact {
            return Err(SyncError::not_exported(format!(
                "address record {} is exported with its parent partner",
                record.name
            )));
        }

        let has_address = [&fields.street, &fields.city, &fields.zip, &fields.country]
            .iter()
            .any(|f| f.is_some());
        let mut payload = PartnerPayload {
            display_name: record.name.clone(),
            given_name: non_empty(&fields.given_name),
            title: non_empty(&fields.title),
            primary_email_addr: non_empty(&fields.email).map(|address| EmailPayload { address }),
            primary_phone: non_empty(&fields.phone)
                .map(|free_form_number| PhonePayload { free_form_number }),
            mobile: non_empty(&fields.mobile).map(|free_form_number| PhonePayload { free_form_number }),
            web_addr: non_empty(&fields.website).map(|uri| WebPayload { uri }),
            notes: non_empty(&fields.notes),
            bill_addr: has_address.then(|| AddressPayload {
                line1: fields.street.clone(),
                line2: fields.street2.clone(),
                city: fields.city.clone(),
                country_sub_division_code: fields.state_code.clone(),
                postal_code: fields.zip.clone(),
                country: fields.country.clone(),
            }),
            parent_ref: None,
            job: None,
        };

        if fields.role == PartnerRole::Customer {
            if let Some(parent_id) = record.parent_id {
                let parent = self
                    .resolver
                    .require_external_id(parent_id, "Parent partner")
                    .await?;
                payload.parent_ref = Some(RefValue::new(parent));
                payload.job = Some(true);
            }
        }

        Ok(match (record.external_id(), fields.role) {
            (Some(id), PartnerRole::Customer) => Plan::Update {
                external_id: id.to_string(),
                fields: UpdateFields::Customer(payload),
            },
            (Some(id), PartnerRole::Vendor) => Plan::Update {
                external_id: id.to_string(),
                fields: UpdateFields::Vendor(payload),
            },
            (None, PartnerRole::Customer) => Plan::Create(CreatePayload::Customer(payload)),
            (None, PartnerRole::Vendor) => Plan::Create(CreatePayload::Vendor(payload)),
        })
    }

    fn plan_payment_method(&self, record: &LedgerRecord, fields: &PaymentMethodFields) -> Plan {
        let payload = PaymentMethodPayload {
            name: record.name.clone(),
            method_type: fields
                .method_type
                .clone()
                .unwrap_or_else(|| "NON_CREDIT_CARD".to_string()),
        };
        match record.external_id() {
            Some(id) => Plan::Update {
                external_id: id.to_string(),
                fields: UpdateFields::PaymentMethod(payload),
            },
            None => Plan::Create(CreatePayload::PaymentMethod(payload)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_id_accepts_string_or_number() {
        assert_eq!(response_id(RemoteEntity::Item, &json!({"Id": "19"})).unwrap(), "19");
        assert_eq!(response_id(RemoteEntity::Item, &json!({"Id": 19})).unwrap(), "19");
        assert!(response_id(RemoteEntity::Item, &json!({"Name": "x"})).is_err());
    }
}
