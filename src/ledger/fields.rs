//! Kind-specific attributes of ledger records, stored as tagged JSON.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecordKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerRole {
    Customer,
    Vendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Contact,
    Invoice,
    Delivery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerFields {
    pub role: PartnerRole,
    pub address_type: AddressType,
    #[serde(default)]
    pub is_company: bool,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub fax: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default = "active")]
    pub active: bool,
}

impl PartnerFields {
    pub fn new(role: PartnerRole, address_type: AddressType) -> Self {
        Self {
            role,
            address_type,
            is_company: false,
            given_name: None,
            title: None,
            email: None,
            phone: None,
            mobile: None,
            fax: None,
            website: None,
            notes: None,
            street: None,
            street2: None,
            city: None,
            zip: None,
            state_code: None,
            country: None,
            active: true,
        }
    }
}

fn active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountFields {
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub account_sub_type: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "active")]
    pub active: bool,
}

/// Journals are owned by the host ledger; the connector only looks them up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalFields {
    pub journal_type: String,
    #[serde(default)]
    pub default_account_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxFields {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub taxable: bool,
    #[serde(default = "active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaxAgencyFields {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTermFields {
    #[serde(default)]
    pub due_days: Option<i64>,
    #[serde(default = "active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodFields {
    /// `CREDIT_CARD` or `NON_CREDIT_CARD`.
    #[serde(default)]
    pub method_type: Option<String>,
    #[serde(default = "active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryFields {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    #[serde(rename = "service")]
    Service,
    /// Stockable product.
    #[serde(rename = "product")]
    Stock,
    #[serde(rename = "consu")]
    Consumable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFields {
    pub product_type: ProductType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub purchase_description: Option<String>,
    #[serde(default)]
    pub list_price: f64,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default = "active")]
    pub active: bool,
    #[serde(default)]
    pub income_account_id: Option<Uuid>,
    #[serde(default)]
    pub expense_account_id: Option<Uuid>,
    #[serde(default)]
    pub sales_tax_id: Option<Uuid>,
    #[serde(default)]
    pub purchase_tax_id: Option<Uuid>,
    #[serde(default)]
    pub qty_on_hand: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceDirection {
    CustomerInvoice,
    VendorBill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    #[serde(default)]
    pub description: Option<String>,
    pub product_id: Uuid,
    pub quantity: f64,
    pub unit_price: f64,
    pub subtotal: f64,
    #[serde(default)]
    pub tax_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFields {
    pub direction: InvoiceDirection,
    pub partner_id: Uuid,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFields {
    pub direction: PaymentDirection,
    #[serde(default)]
    pub partner_id: Option<Uuid>,
    pub amount: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<Uuid>,
    pub journal_id: Uuid,
    #[serde(default)]
    pub invoice_id: Option<Uuid>,
    #[serde(default)]
    pub posted: bool,
}

/// Attribute set of a record; the variant determines its [`RecordKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordFields {
    Partner(PartnerFields),
    Account(AccountFields),
    Journal(JournalFields),
    Tax(TaxFields),
    TaxAgency(TaxAgencyFields),
    PaymentTerm(PaymentTermFields),
    PaymentMethod(PaymentMethodFields),
    ProductCategory(CategoryFields),
    Product(ProductFields),
    Invoice(InvoiceFields),
    Payment(PaymentFields),
}

impl RecordFields {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordFields::Partner(_) => RecordKind::Partner,
            RecordFields::Account(_) => RecordKind::Account,
            RecordFields::Journal(_) => RecordKind::Journal,
            RecordFields::Tax(_) => RecordKind::Tax,
            RecordFields::TaxAgency(_) => RecordKind::TaxAgency,
            RecordFields::PaymentTerm(_) => RecordKind::PaymentTerm,
            RecordFields::PaymentMethod(_) => RecordKind::PaymentMethod,
            RecordFields::ProductCategory(_) => RecordKind::ProductCategory,
            RecordFields::Product(_) => RecordKind::Product,
            RecordFields::Invoice(_) => RecordKind::Invoice,
            RecordFields::Payment(_) => RecordKind::Payment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_by_kind() {
        let fields = RecordFields::Product(ProductFields {
            product_type: ProductType::Consumable,
            description: None,
            purchase_description: None,
            list_price: 3.5,
            cost: None,
            active: true,
            income_account_id: None,
            expense_account_id: None,
            sales_tax_id: None,
            purchase_tax_id: None,
            qty_on_hand: 0.0,
        });
        let value = serde_json::to_value(&fields).unwrap();
        assert_eq!(value["kind"], "product");
        assert_eq!(value["product_type"], "consu");

        let empty: RecordFields = serde_json::from_str(r#"{"kind":"tax_agency"}"#).unwrap();
        assert_eq!(empty.kind(), RecordKind::TaxAgency);
    }
}
