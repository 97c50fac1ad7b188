//! Typed views over normalized remote records.
//!
//! Decoding is lenient in the places where JSON and XML responses disagree:
//! scalars may arrive as strings or numbers, booleans as `"true"`, single
//! children as objects instead of arrays, and references either as bare ids
//! or `{value, name}` objects.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::entity::RemoteEntity;
use crate::error::SyncError;

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    scalar_to_string(value).ok_or_else(|| serde::de::Error::custom("expected a scalar"))
}

fn opt_string_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.and_then(scalar_to_string))
}

fn opt_f64_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{}'", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}

fn bool_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

fn default_true() -> bool {
    true
}

fn active_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => !s.eq_ignore_ascii_case("false"),
        _ => true,
    })
}

fn one_or_many<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
            .collect(),
        Some(single) => serde_json::from_value(single)
            .map(|item| vec![item])
            .map_err(serde::de::Error::custom),
    }
}

/// `{"value": "5", "name": "Acme"}` or just `"5"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    pub value: String,
    pub name: Option<String>,
}

impl<'de> Deserialize<'de> for Ref {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Object(mut members) => {
                let value = members
                    .remove("value")
                    .and_then(scalar_to_string)
                    .ok_or_else(|| serde::de::Error::custom("reference without value"))?;
                let name = members.remove("name").and_then(scalar_to_string);
                Ok(Ref { value, name })
            }
            other => scalar_to_string(other)
                .map(|value| Ref { value, name: None })
                .ok_or_else(|| serde::de::Error::custom("expected a reference")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct EmailAddr {
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PhoneNumber {
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub free_form_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WebAddr {
    #[serde(default, rename = "URI", deserialize_with = "opt_string_lenient")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PhysicalAddress {
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub line1: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub line2: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub country_sub_division_code: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub postal_code: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub country: Option<String>,
}

/// Customer or Vendor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartnerRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub fully_qualified_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub print_on_check_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub given_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub family_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub title: Option<String>,
    #[serde(default)]
    pub primary_email_addr: Option<EmailAddr>,
    #[serde(default)]
    pub primary_phone: Option<PhoneNumber>,
    #[serde(default)]
    pub mobile: Option<PhoneNumber>,
    #[serde(default)]
    pub fax: Option<PhoneNumber>,
    #[serde(default)]
    pub web_addr: Option<WebAddr>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub notes: Option<String>,
    #[serde(default)]
    pub bill_addr: Option<PhysicalAddress>,
    #[serde(default)]
    pub ship_addr: Option<PhysicalAddress>,
    #[serde(default = "default_true", deserialize_with = "active_lenient")]
    pub active: bool,
    #[serde(default)]
    pub parent_ref: Option<Ref>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub acct_num: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub account_type: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub account_sub_type: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub classification: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub description: Option<String>,
    #[serde(default = "default_true", deserialize_with = "active_lenient")]
    pub active: bool,
    #[serde(default)]
    pub parent_ref: Option<Ref>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaxRateDetail {
    #[serde(default)]
    pub tax_rate_ref: Option<Ref>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TaxRateList {
    #[serde(default, deserialize_with = "one_or_many")]
    pub tax_rate_detail: Vec<TaxRateDetail>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaxCodeRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "bool_lenient")]
    pub taxable: bool,
    #[serde(default = "default_true", deserialize_with = "active_lenient")]
    pub active: bool,
    #[serde(default)]
    pub sales_tax_rate_list: Option<TaxRateList>,
    #[serde(default)]
    pub purchase_tax_rate_list: Option<TaxRateList>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaxAgencyRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TermRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "opt_f64_lenient")]
    pub due_days: Option<f64>,
    #[serde(default = "default_true", deserialize_with = "active_lenient")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentMethodRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub name: String,
    #[serde(default, rename = "Type", deserialize_with = "opt_string_lenient")]
    pub method_type: Option<String>,
    #[serde(default = "default_true", deserialize_with = "active_lenient")]
    pub active: bool,
}

/// Item of any type: Category, Service, Inventory or NonInventory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub name: String,
    #[serde(default, rename = "Type", deserialize_with = "opt_string_lenient")]
    pub item_type: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub purchase_desc: Option<String>,
    #[serde(default, deserialize_with = "opt_f64_lenient")]
    pub unit_price: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_lenient")]
    pub purchase_cost: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64_lenient")]
    pub qty_on_hand: Option<f64>,
    #[serde(default = "default_true", deserialize_with = "active_lenient")]
    pub active: bool,
    #[serde(default, deserialize_with = "bool_lenient")]
    pub sub_item: bool,
    #[serde(default)]
    pub parent_ref: Option<Ref>,
    #[serde(default)]
    pub income_account_ref: Option<Ref>,
    #[serde(default)]
    pub expense_account_ref: Option<Ref>,
    #[serde(default)]
    pub asset_account_ref: Option<Ref>,
    #[serde(default)]
    pub sales_tax_code_ref: Option<Ref>,
    #[serde(default)]
    pub purchase_tax_code_ref: Option<Ref>,
}

impl PartnerRecord {
    /// DisplayName, else Name, else the person's name, else the company,
    /// qualified or check name.
    pub fn display(&self) -> Option<String> {
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());
        if let Some(name) = non_empty(&self.display_name).or_else(|| non_empty(&self.name)) {
            return Some(name);
        }
        let person: Vec<String> = [non_empty(&self.given_name), non_empty(&self.family_name)]
            .into_iter()
            .flatten()
            .collect();
        if !person.is_empty() {
            return Some(person.join(" "));
        }
        non_empty(&self.company_name)
            .or_else(|| non_empty(&self.fully_qualified_name))
            .or_else(|| non_empty(&self.print_on_check_name))
    }
}

impl ItemRecord {
    pub fn is_category(&self) -> bool {
        self.item_type.as_deref() == Some("Category")
    }

    pub fn is_inventory(&self) -> bool {
        self.item_type.as_deref() == Some("Inventory")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkedTxn {
    #[serde(deserialize_with = "string_lenient")]
    pub txn_id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub txn_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentLine {
    #[serde(default, deserialize_with = "opt_f64_lenient")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub linked_txn: Vec<LinkedTxn>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CheckPayment {
    #[serde(default)]
    pub bank_account_ref: Option<Ref>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CreditCardPayment {
    #[serde(default, rename = "CCAccountRef")]
    pub cc_account_ref: Option<Ref>,
}

/// Payment or BillPayment; both share this shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentRecord {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub txn_date: Option<String>,
    #[serde(default, deserialize_with = "opt_f64_lenient")]
    pub total_amt: Option<f64>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub doc_number: Option<String>,
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub payment_ref_num: Option<String>,
    #[serde(default)]
    pub customer_ref: Option<Ref>,
    #[serde(default)]
    pub vendor_ref: Option<Ref>,
    #[serde(default)]
    pub payment_method_ref: Option<Ref>,
    #[serde(default)]
    pub deposit_to_account_ref: Option<Ref>,
    #[serde(default, rename = "APAccountRef")]
    pub ap_account_ref: Option<Ref>,
    #[serde(default)]
    pub check_payment: Option<CheckPayment>,
    #[serde(default)]
    pub credit_card_payment: Option<CreditCardPayment>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub line: Vec<PaymentLine>,
}

impl PaymentRecord {
    pub fn partner_ref(&self) -> Option<&Ref> {
        self.customer_ref.as_ref().or(self.vendor_ref.as_ref())
    }

    /// Account the money moved through, by preference order.
    pub fn funding_account_ref(&self) -> Option<&Ref> {
        self.check_payment
            .as_ref()
            .and_then(|c| c.bank_account_ref.as_ref())
            .or_else(|| {
                self.credit_card_payment
                    .as_ref()
                    .and_then(|c| c.cc_account_ref.as_ref())
            })
            .or(self.deposit_to_account_ref.as_ref())
            .or(self.ap_account_ref.as_ref())
    }

    pub fn linked_txns(&self) -> impl Iterator<Item = &LinkedTxn> {
        self.line.iter().flat_map(|line| line.linked_txn.iter())
    }
}

/// Row returned by `select Id,SyncToken from ...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncTokenRow {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    #[serde(deserialize_with = "string_lenient")]
    pub sync_token: String,
}

/// Any record the importer knows how to map.
#[derive(Debug, Clone)]
pub enum RemoteRecord {
    Partner(RemoteEntity, PartnerRecord),
    Account(AccountRecord),
    TaxCode(TaxCodeRecord),
    TaxAgency(TaxAgencyRecord),
    Term(TermRecord),
    PaymentMethod(PaymentMethodRecord),
    Item(ItemRecord),
    Payment(RemoteEntity, PaymentRecord),
}

fn typed<T: serde::de::DeserializeOwned>(entity: RemoteEntity, value: Value) -> Result<T, SyncError> {
    serde_json::from_value(value)
        .map_err(|e| SyncError::decode(format!("malformed {} record: {}", entity, e)))
}

impl RemoteRecord {
    pub fn decode(entity: RemoteEntity, value: Value) -> Result<Self, SyncError> {
        Ok(match entity {
            RemoteEntity::Customer | RemoteEntity::Vendor => {
                RemoteRecord::Partner(entity, typed(entity, value)?)
            }
            RemoteEntity::Account => RemoteRecord::Account(typed(entity, value)?),
            RemoteEntity::TaxCode => RemoteRecord::TaxCode(typed(entity, value)?),
            RemoteEntity::TaxAgency => RemoteRecord::TaxAgency(typed(entity, value)?),
            RemoteEntity::Term => RemoteRecord::Term(typed(entity, value)?),
            RemoteEntity::PaymentMethod => RemoteRecord::PaymentMethod(typed(entity, value)?),
            RemoteEntity::Item => RemoteRecord::Item(typed(entity, value)?),
            RemoteEntity::Payment | RemoteEntity::BillPayment => {
                RemoteRecord::Payment(entity, typed(entity, value)?)
            }
            RemoteEntity::Invoice | RemoteEntity::Bill => {
                return Err(SyncError::decode(format!(
                    "{} records are export-only",
                    entity
                )));
            }
        })
    }

    pub fn entity(&self) -> RemoteEntity {
        match self {
            RemoteRecord::Partner(entity, _) | RemoteRecord::Payment(entity, _) => *entity,
            RemoteRecord::Account(_) => RemoteEntity::Account,
            RemoteRecord::TaxCode(_) => RemoteEntity::TaxCode,
            RemoteRecord::TaxAgency(_) => RemoteEntity::TaxAgency,
            RemoteRecord::Term(_) => RemoteEntity::Term,
            RemoteRecord::PaymentMethod(_) => RemoteEntity::PaymentMethod,
            RemoteRecord::Item(_) => RemoteEntity::Item,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RemoteRecord::Partner(_, r) => &r.id,
            RemoteRecord::Account(r) => &r.id,
            RemoteRecord::TaxCode(r) => &r.id,
            RemoteRecord::TaxAgency(r) => &r.id,
            RemoteRecord::Term(r) => &r.id,
            RemoteRecord::PaymentMethod(r) => &r.id,
            RemoteRecord::Item(r) => &r.id,
            RemoteRecord::Payment(_, r) => &r.id,
        }
    }

    /// Remote records that must exist locally before this one can be mapped.
    pub fn references(&self) -> Vec<(RemoteEntity, String)> {
        let mut refs = Vec::new();
        let mut push = |entity: RemoteEntity, r: Option<&Ref>| {
            if let Some(r) = r.filter(|r| !r.value.is_empty()) {
                refs.push((entity, r.value.clone()));
            }
        };
        match self {
            RemoteRecord::Partner(entity, r) => push(*entity, r.parent_ref.as_ref()),
            RemoteRecord::Account(r) => push(RemoteEntity::Account, r.parent_ref.as_ref()),
            RemoteRecord::Item(r) => {
                push(RemoteEntity::Item, r.parent_ref.as_ref());
                push(RemoteEntity::Account, r.income_account_ref.as_ref());
                push(RemoteEntity::Account, r.expense_account_ref.as_ref());
                push(RemoteEntity::Account, r.asset_account_ref.as_ref());
                push(RemoteEntity::TaxCode, r.sales_tax_code_ref.as_ref());
                push(RemoteEntity::TaxCode, r.purchase_tax_code_ref.as_ref());
            }
            RemoteRecord::Payment(entity, r) => {
                let partner = if *entity == RemoteEntity::BillPayment {
                    RemoteEntity::Vendor
                } else {
                    RemoteEntity::Customer
                };
                push(partner, r.partner_ref());
                push(RemoteEntity::PaymentMethod, r.payment_method_ref.as_ref());
                push(RemoteEntity::Account, r.funding_account_ref());
            }
            RemoteRecord::TaxCode(_)
            | RemoteRecord::TaxAgency(_)
            | RemoteRecord::Term(_)
            | RemoteRecord::PaymentMethod(_) => {}
        }
        refs
    }
}

/// Rows of a query page. A single row may arrive unwrapped from XML.
pub fn query_rows(entity: RemoteEntity, body: Value) -> Vec<Value> {
    let rows = body
        .get("QueryResponse")
        .and_then(|page| page.get(entity.name()))
        .cloned();
    match rows {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

/// The record inside a single-entity response envelope.
pub fn single_row(entity: RemoteEntity, mut body: Value) -> Result<Value, SyncError> {
    body.get_mut(entity.name())
        .map(Value::take)
        .filter(|v| v.is_object())
        .ok_or_else(|| SyncError::decode(format!("response has no {} object", entity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_decodes_from_json_and_xml_shapes() {
        let from_json = json!({
            "Id": "7", "Name": "Chair", "Type": "Inventory", "UnitPrice": 25.5,
            "QtyOnHand": 3, "Active": true, "SubItem": true,
            "ParentRef": {"value": "5", "name": "Furniture"},
            "IncomeAccountRef": {"value": "79"}
        });
        let from_xml = json!({
            "Id": "7", "Name": "Chair", "Type": "Inventory", "UnitPrice": "25.5",
            "QtyOnHand": "3", "Active": "true", "SubItem": "true",
            "ParentRef": {"value": "5", "name": "Furniture"},
            "IncomeAccountRef": "79"
        });

        for value in [from_json, from_xml] {
            let record = RemoteRecord::decode(RemoteEntity::Item, value).unwrap();
            let RemoteRecord::Item(item) = &record else {
                panic!("expected item");
            };
            assert!(item.is_inventory());
            assert_eq!(item.unit_price, Some(25.5));
            assert_eq!(item.qty_on_hand, Some(3.0));
            assert!(item.sub_item);
            assert_eq!(
                record.references(),
                vec![
                    (RemoteEntity::Item, "5".to_string()),
                    (RemoteEntity::Account, "79".to_string()),
                ]
            );
        }
    }

    #[test]
    fn payment_prefers_check_bank_account() {
        let value = json!({
            "Id": "42", "TotalAmt": "100.00",
            "VendorRef": "9",
            "APAccountRef": {"value": "33"},
            "CheckPayment": {"BankAccountRef": {"value": "35"}},
            "Line": {"Amount": "100.00", "LinkedTxn": {"TxnId": "130", "TxnType": "Bill"}}
        });
        let record = RemoteRecord::decode(RemoteEntity::BillPayment, value).unwrap();
        let RemoteRecord::Payment(_, payment) = &record else {
            panic!("expected payment");
        };
        assert_eq!(payment.funding_account_ref().unwrap().value, "35");
        let linked: Vec<_> = payment.linked_txns().collect();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].txn_type, "Bill");
        assert!(record
            .references()
            .contains(&(RemoteEntity::Vendor, "9".to_string())));
    }

    #[test]
    fn query_rows_accepts_single_and_missing() {
        let many = json!({"QueryResponse": {"Term": [{"Id": "1"}, {"Id": "2"}]}});
        assert_eq!(query_rows(RemoteEntity::Term, many).len(), 2);

        let single = json!({"QueryResponse": {"Term": {"Id": "1"}}});
        assert_eq!(query_rows(RemoteEntity::Term, single).len(), 1);

        let empty = json!({"QueryResponse": {}});
        assert!(query_rows(RemoteEntity::Term, empty).is_empty());
    }

    #[test]
    fn inactive_string_flag_is_respected() {
        let value = json!({"Id": "3", "Name": "Net 30", "DueDays": "30", "Active": "false"});
        let record = RemoteRecord::decode(RemoteEntity::Term, value).unwrap();
        let RemoteRecord::Term(term) = record else {
            panic!("expected term");
        };
        assert!(!term.active);
        assert_eq!(term.due_days, Some(30.0));
    }

    #[test]
    fn partner_name_falls_back_through_remote_fields() {
        let display = |value: Value| {
            match RemoteRecord::decode(RemoteEntity::Customer, value).unwrap() {
                RemoteRecord::Partner(_, partner) => partner.display(),
                other => panic!("expected partner, got {:?}", other.entity()),
            }
        };
        assert_eq!(
            display(json!({"Id": "5", "DisplayName": "Acme Ltd", "Name": "Acme"})).as_deref(),
            Some("Acme Ltd")
        );
        assert_eq!(display(json!({"Id": "5", "Name": "Acme"})).as_deref(), Some("Acme"));
        assert_eq!(
            display(json!({"Id": "5", "FullyQualifiedName": "Acme:Shop"})).as_deref(),
            Some("Acme:Shop")
        );
        assert_eq!(
            display(json!({"Id": "5", "PrintOnCheckName": "ACME"})).as_deref(),
            Some("ACME")
        );
        assert_eq!(display(json!({"Id": "5", "DisplayName": " "})), None);
    }

    #[test]
    fn missing_id_is_a_decode_error() {
        let err = RemoteRecord::decode(RemoteEntity::Account, json!({"Name": "Bank"})).unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }
}
