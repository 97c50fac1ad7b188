//! Typed request bodies for remote create and sparse-update calls.
//!
//! Each resource has its own struct so a payload can only carry the fields
//! that resource accepts. Update payloads are separate types from create
//! payloads; server-owned quantity fields exist only on [`ItemCreate`].

use serde::Serialize;

use super::entity::RemoteEntity;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefValue {
    pub value: String,
}

impl RefValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmailPayload {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhonePayload {
    pub free_form_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebPayload {
    #[serde(rename = "URI")]
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct AddressPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_sub_division_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Item type accepted on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemType {
    Service,
    Inventory,
    NonInventory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemCreate {
    pub name: String,
    #[serde(rename = "Type")]
    pub item_type: ItemType,
    pub income_account_ref: RefValue,
    pub expense_account_ref: RefValue,
    pub unit_price: f64,
    pub inv_start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty_on_hand: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_qty_on_hand: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_account_ref: Option<RefValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_item: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<RefValue>,
}

/// Mutable item fields. On-hand quantity is owned by the remote inventory
/// ledger and has no place here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemUpdate {
    pub name: String,
    pub income_account_ref: RefValue,
    pub expense_account_ref: RefValue,
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_item: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<RefValue>,
}

impl From<&ItemCreate> for ItemUpdate {
    fn from(create: &ItemCreate) -> Self {
        Self {
            name: create.name.clone(),
            income_account_ref: create.income_account_ref.clone(),
            expense_account_ref: create.expense_account_ref.clone(),
            unit_price: create.unit_price,
            purchase_cost: create.purchase_cost,
            description: create.description.clone(),
            sku: create.sku.clone(),
            purchase_desc: create.purchase_desc.clone(),
            sub_item: create.sub_item,
            parent_ref: create.parent_ref.clone(),
        }
    }
}

/// Customer or Vendor body; same shape for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PartnerPayload {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_email_addr: Option<EmailPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_phone: Option<PhonePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<PhonePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_addr: Option<WebPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_addr: Option<AddressPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<RefValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentMethodPayload {
    pub name: String,
    #[serde(rename = "Type")]
    pub method_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineDetailType {
    SalesItemLineDetail,
    ItemBasedExpenseLineDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineDetail {
    pub item_ref: RefValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_code_ref: Option<RefValue>,
    pub unit_price: f64,
    pub qty: f64,
}

/// One document line. The detail block's key depends on the detail type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    pub detail_type: LineDetailType,
    #[serde(
        rename = "SalesItemLineDetail",
        skip_serializing_if = "Option::is_none"
    )]
    pub sales_item_line_detail: Option<LineDetail>,
    #[serde(
        rename = "ItemBasedExpenseLineDetail",
        skip_serializing_if = "Option::is_none"
    )]
    pub item_based_expense_line_detail: Option<LineDetail>,
}

impl DocumentLine {
    pub fn new(
        detail_type: LineDetailType,
        description: Option<String>,
        amount: f64,
        detail: LineDetail,
    ) -> Self {
        let (sales, expense) = match detail_type {
            LineDetailType::SalesItemLineDetail => (Some(detail), None),
            LineDetailType::ItemBasedExpenseLineDetail => (None, Some(detail)),
        };
        Self {
            description,
            amount,
            detail_type,
            sales_item_line_detail: sales,
            item_based_expense_line_detail: expense,
        }
    }
}

/// Invoice (with `CustomerRef`) or Bill (with `VendorRef`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<RefValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_ref: Option<RefValue>,
    pub line: Vec<DocumentLine>,
}

/// Full-create body, one variant per exportable resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CreatePayload {
    Item(ItemCreate),
    Customer(PartnerPayload),
    Vendor(PartnerPayload),
    PaymentMethod(PaymentMethodPayload),
    Invoice(DocumentPayload),
    Bill(DocumentPayload),
}

impl CreatePayload {
    pub fn entity(&self) -> RemoteEntity {
        match self {
            CreatePayload::Item(_) => RemoteEntity::Item,
            CreatePayload::Customer(_) => RemoteEntity::Customer,
            CreatePayload::Vendor(_) => RemoteEntity::Vendor,
            CreatePayload::PaymentMethod(_) => RemoteEntity::PaymentMethod,
            CreatePayload::Invoice(_) => RemoteEntity::Invoice,
            CreatePayload::Bill(_) => RemoteEntity::Bill,
        }
    }
}

/// Changed fields of a master record. Posted documents have no variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UpdateFields {
    Item(ItemUpdate),
    Customer(PartnerPayload),
    Vendor(PartnerPayload),
    PaymentMethod(PaymentMethodPayload),
}

impl UpdateFields {
    pub fn entity(&self) -> RemoteEntity {
        match self {
            UpdateFields::Item(_) => RemoteEntity::Item,
            UpdateFields::Customer(_) => RemoteEntity::Customer,
            UpdateFields::Vendor(_) => RemoteEntity::Vendor,
            UpdateFields::PaymentMethod(_) => RemoteEntity::PaymentMethod,
        }
    }
}

/// `{Id, SyncToken, sparse: true}` merged with the changed fields.
#[derive(Debug, Clone, Serialize)]
pub struct SparseUpdate<'a> {
    #[serde(rename = "Id")]
    pub id: &'a str,
    #[serde(rename = "SyncToken")]
    pub sync_token: &'a str,
    pub sparse: bool,
    #[serde(flatten)]
    pub fields: &'a UpdateFields,
}

impl<'a> SparseUpdate<'a> {
    pub fn new(id: &'a str, sync_token: &'a str, fields: &'a UpdateFields) -> Self {
        Self {
            id,
            sync_token,
            sparse: true,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ItemCreate {
        ItemCreate {
            name: "Chair".into(),
            item_type: ItemType::Inventory,
            income_account_ref: RefValue::new("79"),
            expense_account_ref: RefValue::new("80"),
            unit_price: 25.0,
            inv_start_date: "2024-03-01".into(),
            purchase_cost: Some(12.0),
            description: None,
            sku: Some("CH-1".into()),
            purchase_desc: None,
            qty_on_hand: Some(4.0),
            track_qty_on_hand: Some(true),
            asset_account_ref: Some(RefValue::new("81")),
            sub_item: None,
            parent_ref: None,
        }
    }

    #[test]
    fn item_create_carries_inventory_fields() {
        let value = serde_json::to_value(CreatePayload::Item(item())).unwrap();
        assert_eq!(value["Type"], "Inventory");
        assert_eq!(value["QtyOnHand"], 4.0);
        assert_eq!(value["IncomeAccountRef"]["value"], "79");
        assert!(value.get("Description").is_none());
    }

    #[test]
    fn sparse_item_update_never_has_quantity() {
        let fields = UpdateFields::Item(ItemUpdate::from(&item()));
        let value = serde_json::to_value(SparseUpdate::new("7", "3", &fields)).unwrap();
        assert_eq!(value["Id"], "7");
        assert_eq!(value["SyncToken"], "3");
        assert_eq!(value["sparse"], true);
        assert_eq!(value["Sku"], "CH-1");
        assert!(value.get("QtyOnHand").is_none());
        assert!(value.get("TrackQtyOnHand").is_none());
        assert!(value.get("InvStartDate").is_none());
    }

    #[test]
    fn sales_line_uses_matching_detail_key() {
        let line = DocumentLine::new(
            LineDetailType::SalesItemLineDetail,
            Some("Consulting".into()),
            100.0,
            LineDetail {
                item_ref: RefValue::new("12"),
                tax_code_ref: Some(RefValue::new("TAX")),
                unit_price: 50.0,
                qty: 2.0,
            },
        );
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(value["DetailType"], "SalesItemLineDetail");
        assert_eq!(value["SalesItemLineDetail"]["ItemRef"]["value"], "12");
        assert!(value.get("ItemBasedExpenseLineDetail").is_none());
    }
}
