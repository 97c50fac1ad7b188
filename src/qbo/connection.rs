//! Decrypted, in-memory view of a QuickBooks connection.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SyncError;

/// Everything needed to authenticate and address one QuickBooks company.
///
/// Passed explicitly through every token, import and export call.
#[derive(Clone)]
pub struct Connection {
    pub id: Uuid,
    pub display_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub realm_id: Option<String>,
    pub auth_code: Option<String>,
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub minor_version: String,
    pub export_minor_version: String,
    pub country_code: Option<String>,
}

impl Connection {
    /// The access token, if present and `now` is strictly before its expiry.
    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.access_token, self.access_token_expires_at) {
            (Some(token), Some(expiry)) if now < expiry => Some(token.as_str()),
            _ => None,
        }
    }

    /// The refresh token, if present and `now` is strictly before its expiry.
    pub fn valid_refresh_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.refresh_token, self.refresh_token_expires_at) {
            (Some(token), Some(expiry)) if now < expiry => Some(token.as_str()),
            _ => None,
        }
    }

    pub fn realm(&self) -> Result<&str, SyncError> {
        self.realm_id
            .as_deref()
            .filter(|realm| !realm.is_empty())
            .ok_or_else(|| {
                SyncError::config(format!(
                    "connection {} has no realm id; complete the authorization flow",
                    self.id
                ))
            })
    }

    /// `<api_base_url><realm_id>`, the prefix of every resource URL.
    pub fn company_url(&self) -> Result<String, SyncError> {
        if self.api_base_url.is_empty() {
            return Err(SyncError::config(format!(
                "connection {} has no API base URL",
                self.id
            )));
        }
        let realm = self.realm()?;
        let base = self.api_base_url.trim_end_matches('/');
        Ok(format!("{}/{}", base, realm))
    }

    pub fn is_us_company(&self) -> bool {
        self.country_code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case("US"))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("client_id", &self.client_id)
            .field("token_endpoint", &self.token_endpoint)
            .field("api_base_url", &self.api_base_url)
            .field("realm_id", &self.realm_id)
            .field("has_access_token", &self.access_token.is_some())
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn connection() -> Connection {
        Connection {
            id: Uuid::new_v4(),
            display_name: "Acme Books".into(),
            client_id: "client".into(),
            client_secret: "very-secret".into(),
            authorization_endpoint: "https://auth.example/oauth2".into(),
            token_endpoint: "https://auth.example/token".into(),
            redirect_uri: "http://localhost/get_auth_code".into(),
            api_base_url: "https://api.example/v3/company/".into(),
            realm_id: Some("9130".into()),
            auth_code: None,
            access_token: Some("access".into()),
            access_token_expires_at: Some(Utc::now() + Duration::minutes(5)),
            refresh_token: Some("refresh".into()),
            refresh_token_expires_at: Some(Utc::now() - Duration::seconds(1)),
            minor_version: "8".into(),
            export_minor_version: "12".into(),
            country_code: Some("us".into()),
        }
    }

    #[test]
    fn token_validity_is_strict_about_expiry() {
        let conn = connection();
        let now = Utc::now();
        assert_eq!(conn.valid_access_token(now), Some("access"));
        assert!(conn.valid_refresh_token(now).is_none());

        let expiry = conn.access_token_expires_at.unwrap();
        assert!(conn.valid_access_token(expiry).is_none());
    }

    #[test]
    fn company_url_joins_base_and_realm() {
        assert_eq!(
            connection().company_url().unwrap(),
            "https://api.example/v3/company/9130"
        );
    }

    #[test]
    fn missing_realm_is_a_config_error() {
        let conn = Connection {
            realm_id: None,
            ..connection()
        };
        assert!(matches!(conn.company_url(), Err(SyncError::Config { .. })));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", connection());
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("\"access\""));
        assert!(connection().is_us_company());
    }
}
