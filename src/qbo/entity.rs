//! Catalogue of remote QuickBooks entities and the import streams built on them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Remote resource types the connector reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum RemoteEntity {
    Customer,
    Vendor,
    Account,
    TaxCode,
    TaxAgency,
    Item,
    PaymentMethod,
    Payment,
    BillPayment,
    Term,
    Invoice,
    Bill,
}

impl RemoteEntity {
    /// Entity name as used in query text and as the response envelope key.
    pub fn name(self) -> &'static str {
        match self {
            RemoteEntity::Customer => "Customer",
            RemoteEntity::Vendor => "Vendor",
            RemoteEntity::Account => "Account",
            RemoteEntity::TaxCode => "TaxCode",
            RemoteEntity::TaxAgency => "TaxAgency",
            RemoteEntity::Item => "Item",
            RemoteEntity::PaymentMethod => "PaymentMethod",
            RemoteEntity::Payment => "Payment",
            RemoteEntity::BillPayment => "BillPayment",
            RemoteEntity::Term => "Term",
            RemoteEntity::Invoice => "Invoice",
            RemoteEntity::Bill => "Bill",
        }
    }

    /// REST path segment under `/v3/company/<realm>/`.
    pub fn resource(self) -> &'static str {
        match self {
            RemoteEntity::Customer => "customer",
            RemoteEntity::Vendor => "vendor",
            RemoteEntity::Account => "account",
            RemoteEntity::TaxCode => "taxcode",
            RemoteEntity::TaxAgency => "taxagency",
            RemoteEntity::Item => "item",
            RemoteEntity::PaymentMethod => "paymentmethod",
            RemoteEntity::Payment => "payment",
            RemoteEntity::BillPayment => "billpayment",
            RemoteEntity::Term => "term",
            RemoteEntity::Invoice => "invoice",
            RemoteEntity::Bill => "bill",
        }
    }

    /// Entities that accept sparse updates from this connector.
    pub fn is_updatable(self) -> bool {
        matches!(
            self,
            RemoteEntity::Customer
                | RemoteEntity::Vendor
                | RemoteEntity::Item
                | RemoteEntity::PaymentMethod
        )
    }
}

impl fmt::Display for RemoteEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown remote entity '{0}'")]
pub struct UnknownRemoteEntity(pub String);

impl FromStr for RemoteEntity {
    type Err = UnknownRemoteEntity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entity = match s {
            "Customer" => RemoteEntity::Customer,
            "Vendor" => RemoteEntity::Vendor,
            "Account" => RemoteEntity::Account,
            "TaxCode" => RemoteEntity::TaxCode,
            "TaxAgency" => RemoteEntity::TaxAgency,
            "Item" => RemoteEntity::Item,
            "PaymentMethod" => RemoteEntity::PaymentMethod,
            "Payment" => RemoteEntity::Payment,
            "BillPayment" => RemoteEntity::BillPayment,
            "Term" => RemoteEntity::Term,
            "Invoice" => RemoteEntity::Invoice,
            "Bill" => RemoteEntity::Bill,
            other => return Err(UnknownRemoteEntity(other.to_string())),
        };
        Ok(entity)
    }
}

/// Independently paginated import feeds, each with its own cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImportStream {
    Customer,
    Vendor,
    Account,
    TaxCode,
    TaxAgency,
    Category,
    Product,
    Inventory,
    PaymentMethod,
    Payment,
    BillPayment,
    Term,
}

impl ImportStream {
    /// Every stream, ordered so referenced entities are usually present before their referrers.
    pub const ALL: [ImportStream; 12] = [
        ImportStream::Account,
        ImportStream::TaxAgency,
        ImportStream::TaxCode,
        ImportStream::Term,
        ImportStream::PaymentMethod,
        ImportStream::Category,
        ImportStream::Customer,
        ImportStream::Vendor,
        ImportStream::Product,
        ImportStream::Inventory,
        ImportStream::Payment,
        ImportStream::BillPayment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImportStream::Customer => "customer",
            ImportStream::Vendor => "vendor",
            ImportStream::Account => "account",
            ImportStream::TaxCode => "tax_code",
            ImportStream::TaxAgency => "tax_agency",
            ImportStream::Category => "category",
            ImportStream::Product => "product",
            ImportStream::Inventory => "inventory",
            ImportStream::PaymentMethod => "payment_method",
            ImportStream::Payment => "payment",
            ImportStream::BillPayment => "bill_payment",
            ImportStream::Term => "term",
        }
    }

    pub fn remote(self) -> RemoteEntity {
        match self {
            ImportStream::Customer => RemoteEntity::Customer,
            ImportStream::Vendor => RemoteEntity::Vendor,
            ImportStream::Account => RemoteEntity::Account,
            ImportStream::TaxCode => RemoteEntity::TaxCode,
            ImportStream::TaxAgency => RemoteEntity::TaxAgency,
            ImportStream::Category | ImportStream::Product | ImportStream::Inventory => {
                RemoteEntity::Item
            }
            ImportStream::PaymentMethod => RemoteEntity::PaymentMethod,
            ImportStream::Payment => RemoteEntity::Payment,
            ImportStream::BillPayment => RemoteEntity::BillPayment,
            ImportStream::Term => RemoteEntity::Term,
        }
    }

    fn type_filter(self) -> Option<&'static str> {
        match self {
            ImportStream::Category => Some("Type='Category'"),
            ImportStream::Inventory => Some("Type='Inventory'"),
            _ => None,
        }
    }

    /// Query statement fetching the page after `cursor`. The cursor must be a
    /// numeric remote Id; callers validate it before it reaches this point.
    pub fn query(self, cursor: &str) -> String {
        let table = self.remote().name();
        match self.type_filter() {
            Some(filter) => format!(
                "select * from {} where {} AND Id > '{}' order by Id",
                table, filter, cursor
            ),
            None => format!("select * from {} where Id > '{}' order by Id", table, cursor),
        }
    }
}

impl fmt::Display for ImportStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown import stream '{0}'")]
pub struct UnknownImportStream(pub String);

impl FromStr for ImportStream {
    type Err = UnknownImportStream;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImportStream::ALL
            .into_iter()
            .find(|stream| stream.as_str() == s)
            .ok_or_else(|| UnknownImportStream(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_queries_embed_cursor_and_order() {
        assert_eq!(
            ImportStream::Customer.query("0"),
            "select * from Customer where Id > '0' order by Id"
        );
        assert_eq!(
            ImportStream::Category.query("12"),
            "select * from Item where Type='Category' AND Id > '12' order by Id"
        );
        assert_eq!(
            ImportStream::BillPayment.query("3"),
            "select * from BillPayment where Id > '3' order by Id"
        );
    }

    #[test]
    fn stream_names_round_trip() {
        for stream in ImportStream::ALL {
            assert_eq!(stream.as_str().parse::<ImportStream>().unwrap(), stream);
        }
        assert!("ledger".parse::<ImportStream>().is_err());
    }

    #[test]
    fn remote_entity_names_parse() {
        assert_eq!("Item".parse::<RemoteEntity>().unwrap(), RemoteEntity::Item);
        assert!("item".parse::<RemoteEntity>().is_err());
    }
}
