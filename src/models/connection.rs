//! Connection entity model
//!
//! SeaORM entity for the `qbo_connections` table. Secrets are stored sealed;
//! see [`crate::repositories::connection`] for the decrypted view.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// One QuickBooks company authorized through OAuth2.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "qbo_connections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub display_name: String,

    pub client_id: String,

    pub client_secret_ciphertext: Vec<u8>,

    pub authorization_endpoint: String,

    pub token_endpoint: String,

    pub redirect_uri: String,

    /// Base such as `https://quickbooks.api.intuit.com/v3/company/`; the realm is appended.
    pub api_base_url: String,

    /// Remote tenant identifier delivered by the redirect callback.
    pub realm_id: Option<String>,

    pub auth_code: Option<String>,

    pub access_token_ciphertext: Option<Vec<u8>>,

    pub access_token_expires_at: Option<DateTimeWithTimeZone>,

    pub refresh_token_ciphertext: Option<Vec<u8>>,

    pub refresh_token_expires_at: Option<DateTimeWithTimeZone>,

    pub minor_version: String,

    pub export_minor_version: String,

    /// ISO country of the company; `US` switches invoice tax codes to TAX/NON.
    pub country_code: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
