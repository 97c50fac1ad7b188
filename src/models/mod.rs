//! # Data Models
//!
//! SeaORM entities persisted by the connector.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod import_cursor;
pub mod ledger_record;
pub mod oauth_state;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "qbo-connector".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
