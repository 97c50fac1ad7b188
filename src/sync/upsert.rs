//! # Entity Upsert Engine
//!
//! Turns decoded remote records into ledger writes. Each record is matched
//! against the ledger by its dedup key (the stored external reference, plus
//! the SKU for products). A match is updated in place, otherwise every
//! reference is resolved and a new record is created. More than one match is
//! an integrity violation and nothing is written.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::counter;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::resolver::{RecordSink, ReferenceResolver};
use crate::error::SyncError;
use crate::ledger::{
    AccountFields, AddressType, CategoryFields, ExternalRef, Ledger, LedgerRecord, NewRecord,
    PartnerFields, PartnerRole, PaymentDirection, PaymentFields, PaymentMethodFields,
    PaymentTermFields, ProductFields, ProductType, RecordFields, RecordKind, RecordState,
    TaxAgencyFields, TaxFields, expect_single,
};
use crate::qbo::RemoteEntity;
use crate::qbo::records::{
    AccountRecord, ItemRecord, PartnerRecord, PaymentMethodRecord, PaymentRecord,
    PhysicalAddress, Ref, RemoteRecord, TaxAgencyRecord, TaxCodeRecord, TermRecord,
};

/// What happened to one remote record.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Uuid),
    Updated(Uuid),
    Unchanged(Uuid),
    Skipped { reason: String },
}

impl UpsertOutcome {
    pub fn local_id(&self) -> Option<Uuid> {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) | UpsertOutcome::Unchanged(id) => {
                Some(*id)
            }
            UpsertOutcome::Skipped { .. } => None,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        UpsertOutcome::Skipped {
            reason: reason.into(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            UpsertOutcome::Created(_) => "created",
            UpsertOutcome::Updated(_) => "updated",
            UpsertOutcome::Unchanged(_) => "unchanged",
            UpsertOutcome::Skipped { .. } => "skipped",
        }
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

fn product_type(item: &ItemRecord) -> Option<ProductType> {
    match item.item_type.as_deref() {
        Some("Service") => Some(ProductType::Service),
        Some("Inventory") => Some(ProductType::Stock),
        Some("NonInventory") => Some(ProductType::Consumable),
        _ => None,
    }
}

fn phone(p: &Option<crate::qbo::records::PhoneNumber>) -> Option<String> {
    p.as_ref().and_then(|p| p.free_form_number.clone())
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|d| NaiveDate::parse_from_str(d.get(..10).unwrap_or(d), "%Y-%m-%d").ok())
}

fn address_is_empty(addr: &PhysicalAddress) -> bool {
    [
        &addr.line1,
        &addr.line2,
        &addr.city,
        &addr.postal_code,
        &addr.country_sub_division_code,
        &addr.country,
    ]
    .iter()
    .all(|field| field.as_deref().is_none_or(|s| s.trim().is_empty()))
}

pub struct EntityUpsertEngine {
    ledger: Arc<dyn Ledger>,
    resolver: ReferenceResolver,
}

impl EntityUpsertEngine {
    pub fn new(ledger: Arc<dyn Ledger>, resolver: ReferenceResolver) -> Self {
        Self { ledger, resolver }
    }

    /// Maps one imported record, resolving its references first.
    #[instrument(skip_all, fields(entity = %record.entity(), remote_id = %record.id()))]
    pub async fn upsert(&self, record: &RemoteRecord) -> Result<UpsertOutcome, SyncError> {
        match record {
            RemoteRecord::Payment(entity, payment) => {
                if let Some(existing) = self.resolver.lookup(*entity, &payment.id).await? {
                    return self.finish_payment(existing).await;
                }
                if self.linked_document(payment).await?.is_none() {
                    return Ok(UpsertOutcome::skipped(
                        "linked invoice or bill is not imported",
                    ));
                }
            }
            RemoteRecord::Item(item) if !item.is_category() && product_type(item).is_none() => {
                return Ok(UpsertOutcome::skipped(format!(
                    "unsupported item type {}",
                    item.item_type.as_deref().unwrap_or("<none>")
                )));
            }
            _ => {}
        }

        self.resolver.resolve_all(&record.references(), self).await?;
        let outcome = self.apply(record).await?;
        counter!("qbo_import_records_total", "outcome" => outcome.label()).increment(1);
        Ok(outcome)
    }

    /// Applies the remote on-hand quantity to an already-imported stock product.
    #[instrument(skip_all, fields(remote_id = %record.id()))]
    pub async fn sync_inventory(&self, record: &RemoteRecord) -> Result<UpsertOutcome, SyncError> {
        let RemoteRecord::Item(item) = record else {
            return Ok(UpsertOutcome::skipped("not an item"));
        };
        let Some(product) = self.resolver.lookup(RemoteEntity::Item, &item.id).await? else {
            return Ok(UpsertOutcome::skipped("product is not imported"));
        };
        let RecordFields::Product(fields) = &product.fields else {
            return Ok(UpsertOutcome::skipped("local record is not a product"));
        };
        if fields.product_type != ProductType::Stock {
            return Ok(UpsertOutcome::skipped("local product is not stockable"));
        }
        match item.qty_on_hand {
            Some(quantity) if quantity >= 0.0 && quantity != fields.qty_on_hand => {
                self.ledger.adjust_stock_quantity(product.id, quantity).await?;
                debug!(product_id = %product.id, quantity, "adjusted stock on hand");
                Ok(UpsertOutcome::Updated(product.id))
            }
            _ => Ok(UpsertOutcome::Unchanged(product.id)),
        }
    }

    async fn local_ref(
        &self,
        entity: RemoteEntity,
        reference: Option<&Ref>,
    ) -> Result<Option<Uuid>, SyncError> {
        let Some(reference) = reference.filter(|r| !r.value.is_empty()) else {
            return Ok(None);
        };
        match self.resolver.lookup(entity, &reference.value).await? {
            Some(record) => Ok(Some(record.id)),
            None => Err(SyncError::integrity(format!(
                "unresolved {} reference {}",
                entity, reference.value
            ))),
        }
    }

    async fn save(
        &self,
        existing: Option<LedgerRecord>,
        new: NewRecord,
    ) -> Result<UpsertOutcome, SyncError> {
        match existing {
            Some(mut record) => {
                record.name = new.name;
                record.code = new.code;
                record.parent_id = new.parent_id;
                record.fields = new.fields;
                if new.external_ref.is_some() {
                    record.external_ref = new.external_ref;
                }
                self.ledger.update(&record).await?;
                Ok(UpsertOutcome::Updated(record.id))
            }
            None => {
                let record = self.ledger.create(new).await?;
                Ok(UpsertOutcome::Created(record.id))
            }
        }
    }

    async fn map_partner(
        &self,
        entity: RemoteEntity,
        partner: &PartnerRecord,
    ) -> Result<UpsertOutcome, SyncError> {
        let name = partner.display().ok_or_else(|| {
            SyncError::decode(format!("{} {} carries no usable name", entity, partner.id))
        })?;
        let role = if entity == RemoteEntity::Vendor {
            PartnerRole::Vendor
        } else {
            PartnerRole::Customer
        };

        let mut fields = PartnerFields::new(role, AddressType::Contact);
        fields.is_company = partner
            .company_name
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        fields.given_name = partner.given_name.clone();
        fields.title = partner.title.clone();
        fields.email = partner
            .primary_email_addr
            .as_ref()
            .and_then(|e| e.address.clone());
        fields.phone = phone(&partner.primary_phone);
        fields.mobile = phone(&partner.mobile);
        fields.fax = phone(&partner.fax);
        fields.website = partner.web_addr.as_ref().and_then(|w| w.uri.clone());
        fields.notes = partner.notes.clone();
        fields.active = partner.active;

        let parent_id = self.local_ref(entity, partner.parent_ref.as_ref()).await?;
        let existing = self.resolver.lookup(entity, &partner.id).await?;
        let new = NewRecord::new(name.clone(), RecordFields::Partner(fields))
            .with_external_ref(ExternalRef::new(entity, &partner.id))
            .with_parent(parent_id);
        let outcome = self.save(existing, new).await?;

        if let Some(partner_id) = outcome.local_id() {
            for (address, address_type) in [
                (&partner.bill_addr, AddressType::Invoice),
                (&partner.ship_addr, AddressType::Delivery),
            ] {
                if let Some(address) = address.as_ref().filter(|a| !address_is_empty(a)) {
                    self.save_address(partner_id, &name, role, address_type, address)
                        .await?;
                }
            }
        }
        Ok(outcome)
    }

    /// Billing and shipping addresses live in owned child partners, one per type.
    async fn save_address(
        &self,
        partner_id: Uuid,
        name: &str,
        role: PartnerRole,
        address_type: AddressType,
        address: &PhysicalAddress,
    ) -> Result<(), SyncError> {
        let children: Vec<LedgerRecord> = self
            .ledger
            .find_children(partner_id, RecordKind::Partner)
            .await?
            .into_iter()
            .filter(|child| {
                matches!(&child.fields, RecordFields::Partner(f) if f.address_type == address_type)
            })
            .collect();
        let existing = expect_single(
            children,
            format!("{:?} address of partner {}", address_type, partner_id),
        )?;

        let mut fields = PartnerFields::new(role, address_type);
        fields.street = address.line1.clone();
        fields.street2 = address.line2.clone();
        fields.city = address.city.clone();
        fields.zip = address.postal_code.clone();
        fields.state_code = address.country_sub_division_code.clone();
        fields.country = address.country.clone();

        let new = NewRecord::new(name, RecordFields::Partner(fields)).with_parent(Some(partner_id));
        self.save(existing, new).await?;
        Ok(())
    }

    async fn map_account(&self, account: &AccountRecord) -> Result<UpsertOutcome, SyncError> {
        let parent_id = self
            .local_ref(RemoteEntity::Account, account.parent_ref.as_ref())
            .await?;
        let existing = self.resolver.lookup(RemoteEntity::Account, &account.id).await?;
        let fields = AccountFields {
            account_type: account.account_type.clone(),
            account_sub_type: account.account_sub_type.clone(),
            classification: account.classification.clone(),
            description: account.description.clone(),
            active: account.active,
        };
        let new = NewRecord::new(&account.name, RecordFields::Account(fields))
            .with_external_ref(ExternalRef::new(RemoteEntity::Account, &account.id))
            .with_code(account.acct_num.clone())
            .with_parent(parent_id);
        self.save(existing, new).await
    }

    async fn map_tax_code(&self, tax: &TaxCodeRecord) -> Result<UpsertOutcome, SyncError> {
        let existing = self.resolver.lookup(RemoteEntity::TaxCode, &tax.id).await?;
        let fields = TaxFields {
            description: tax.description.clone(),
            taxable: tax.taxable,
            active: tax.active,
        };
        let new = NewRecord::new(&tax.name, RecordFields::Tax(fields))
            .with_external_ref(ExternalRef::new(RemoteEntity::TaxCode, &tax.id));
        self.save(existing, new).await
    }

    async fn map_tax_agency(&self, agency: &TaxAgencyRecord) -> Result<UpsertOutcome, SyncError> {
        let existing = self
            .resolver
            .lookup(RemoteEntity::TaxAgency, &agency.id)
            .await?;
        let new = NewRecord::new(&agency.display_name, RecordFields::TaxAgency(TaxAgencyFields {}))
            .with_external_ref(ExternalRef::new(RemoteEntity::TaxAgency, &agency.id));
        self.save(existing, new).await
    }

    async fn map_term(&self, term: &TermRecord) -> Result<UpsertOutcome, SyncError> {
        let existing = match self.resolver.lookup(RemoteEntity::Term, &term.id).await? {
            Some(record) => Some(record),
            None => {
                // Terms created locally before the first import are adopted by name.
                let unlinked = self
                    .ledger
                    .find_by_name(RecordKind::PaymentTerm, &term.name)
                    .await?
                    .into_iter()
                    .filter(|r| r.external_ref.is_none())
                    .collect();
                expect_single(unlinked, format!("payment term named '{}'", term.name))?
            }
        };
        let fields = PaymentTermFields {
            due_days: term.due_days.map(|d| d.round() as i64),
            active: term.active,
        };
        let new = NewRecord::new(&term.name, RecordFields::PaymentTerm(fields))
            .with_external_ref(ExternalRef::new(RemoteEntity::Term, &term.id));
        self.save(existing, new).await
    }

    async fn map_payment_method(
        &self,
        method: &PaymentMethodRecord,
    ) -> Result<UpsertOutcome, SyncError> {
        let existing = self
            .resolver
            .lookup(RemoteEntity::PaymentMethod, &method.id)
            .await?;
        let fields = PaymentMethodFields {
            method_type: method.method_type.clone(),
            active: method.active,
        };
        let new = NewRecord::new(&method.name, RecordFields::PaymentMethod(fields))
            .with_external_ref(ExternalRef::new(RemoteEntity::PaymentMethod, &method.id));
        self.save(existing, new).await
    }

    async fn map_item(&self, item: &ItemRecord) -> Result<UpsertOutcome, SyncError> {
        let parent_id = self
            .local_ref(RemoteEntity::Item, item.parent_ref.as_ref())
            .await?;
        let external_ref = ExternalRef::new(RemoteEntity::Item, &item.id);

        if item.is_category() {
            let existing = self.resolver.lookup(RemoteEntity::Item, &item.id).await?;
            let new = NewRecord::new(&item.name, RecordFields::ProductCategory(CategoryFields {}))
                .with_external_ref(external_ref)
                .with_parent(parent_id);
            return self.save(existing, new).await;
        }

        let Some(product_type) = product_type(item) else {
            return Ok(UpsertOutcome::skipped("unsupported item type"));
        };

        // Dedup key is SKU or remote id; both may point at the same record.
        let mut candidates = self
            .ledger
            .find_by_external_ref(RemoteEntity::Item, &item.id)
            .await?;
        if let Some(sku) = item.sku.as_deref().filter(|s| !s.trim().is_empty()) {
            for record in self.ledger.find_by_code(RecordKind::Product, sku).await? {
                if !candidates.iter().any(|c| c.id == record.id) {
                    candidates.push(record);
                }
            }
        }
        let existing = expect_single(candidates, format!("Item {}", item.id))?;

        let qty_on_hand = match existing.as_ref().map(|r| &r.fields) {
            Some(RecordFields::Product(current)) => current.qty_on_hand,
            _ if product_type == ProductType::Stock => item.qty_on_hand.unwrap_or(0.0).max(0.0),
            _ => 0.0,
        };
        let fields = ProductFields {
            product_type,
            description: item.description.clone(),
            purchase_description: item.purchase_desc.clone(),
            list_price: item.unit_price.unwrap_or(0.0),
            cost: item.purchase_cost,
            active: item.active,
            income_account_id: self
                .local_ref(RemoteEntity::Account, item.income_account_ref.as_ref())
                .await?,
            expense_account_id: self
                .local_ref(RemoteEntity::Account, item.expense_account_ref.as_ref())
                .await?,
            sales_tax_id: self
                .local_ref(RemoteEntity::TaxCode, item.sales_tax_code_ref.as_ref())
                .await?,
            purchase_tax_id: self
                .local_ref(RemoteEntity::TaxCode, item.purchase_tax_code_ref.as_ref())
                .await?,
            qty_on_hand,
        };
        let new = NewRecord::new(&item.name, RecordFields::Product(fields))
            .with_external_ref(external_ref)
            .with_code(item.sku.clone())
            .with_parent(parent_id);
        self.save(existing, new).await
    }

    async fn linked_document(
        &self,
        payment: &PaymentRecord,
    ) -> Result<Option<LedgerRecord>, SyncError> {
        let Some(linked) = payment.linked_txns().next() else {
            return Ok(None);
        };
        let entity = match linked.txn_type.as_str() {
            "Invoice" => RemoteEntity::Invoice,
            "Bill" => RemoteEntity::Bill,
            _ => return Ok(None),
        };
        self.resolver.lookup(entity, &linked.txn_id).await
    }

    /// Posts a payment left in draft by an interrupted import; posted
    /// payments are never rewritten.
    async fn finish_payment(&self, existing: LedgerRecord) -> Result<UpsertOutcome, SyncError> {
        let posted = matches!(&existing.fields, RecordFields::Payment(f) if f.posted)
            && existing.state == RecordState::Posted;
        if posted {
            return Ok(UpsertOutcome::Unchanged(existing.id));
        }
        self.ledger.post_payment(existing.id).await?;
        debug!(payment_id = %existing.id, "posted draft payment");
        Ok(UpsertOutcome::Updated(existing.id))
    }

    async fn map_payment(
        &self,
        entity: RemoteEntity,
        payment: &PaymentRecord,
    ) -> Result<UpsertOutcome, SyncError> {
        if let Some(existing) = self.resolver.lookup(entity, &payment.id).await? {
            return self.finish_payment(existing).await;
        }
        let Some(document) = self.linked_document(payment).await? else {
            return Ok(UpsertOutcome::skipped("linked invoice or bill is not imported"));
        };

        let account_ref = payment
            .funding_account_ref()
            .ok_or_else(|| SyncError::integrity("Payment Journal required"))?;
        let account = self
            .ledger
            .find_account_by_external_ref(&account_ref.value)
            .await?
            .ok_or_else(|| {
                SyncError::integrity(format!("unresolved Account reference {}", account_ref.value))
            })?;
        let journal = self
            .ledger
            .find_journal_for_account(account.id)
            .await?
            .ok_or_else(|| {
                SyncError::integrity(format!(
                    "Please, define payment journal for {} account",
                    account.name
                ))
            })?;

        let partner_entity = if entity == RemoteEntity::BillPayment {
            RemoteEntity::Vendor
        } else {
            RemoteEntity::Customer
        };
        let fields = PaymentFields {
            direction: if entity == RemoteEntity::BillPayment {
                PaymentDirection::Outbound
            } else {
                PaymentDirection::Inbound
            },
            partner_id: self.local_ref(partner_entity, payment.partner_ref()).await?,
            amount: payment.total_amt.unwrap_or(0.0),
            date: parse_date(payment.txn_date.as_deref()),
            reference: payment
                .payment_ref_num
                .clone()
                .or_else(|| payment.doc_number.clone()),
            payment_method_id: self
                .local_ref(RemoteEntity::PaymentMethod, payment.payment_method_ref.as_ref())
                .await?,
            journal_id: journal.id,
            invoice_id: Some(document.id),
            posted: false,
        };
        let name = fields
            .reference
            .clone()
            .unwrap_or_else(|| format!("{} {}", entity, payment.id));

        let created = self
            .ledger
            .create(
                NewRecord::new(name, RecordFields::Payment(fields))
                    .with_external_ref(ExternalRef::new(entity, &payment.id))
                    .with_state(RecordState::Draft),
            )
            .await?;
        self.ledger.post_payment(created.id).await?;
        Ok(UpsertOutcome::Created(created.id))
    }
}

#[async_trait]
impl RecordSink for EntityUpsertEngine {
    async fn apply(&self, record: &RemoteRecord) -> Result<UpsertOutcome, SyncError> {
        match record {
            RemoteRecord::Partner(entity, partner) => self.map_partner(*entity, partner).await,
            RemoteRecord::Account(account) => self.map_account(account).await,
            RemoteRecord::TaxCode(tax) => self.map_tax_code(tax).await,
            RemoteRecord::TaxAgency(agency) => self.map_tax_agency(agency).await,
            RemoteRecord::Term(term) => self.map_term(term).await,
            RemoteRecord::PaymentMethod(method) => self.map_payment_method(method).await,
            RemoteRecord::Item(item) => self.map_item(item).await,
            RemoteRecord::Payment(entity, payment) => self.map_payment(*entity, payment).await,
        }
    }
}
