//! # Token Manager
//!
//! Owns the OAuth2 lifecycle of a QuickBooks connection: building the
//! authorize URL, exchanging the authorization code, and refreshing the
//! access token. Refreshes are serialized per connection; the remote rotates
//! the refresh token on every refresh, so two concurrent refreshes would
//! invalidate each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::connection::Connection;
use crate::error::SyncError;
use crate::repositories::{ConnectionRepository, TokenGrant};

/// Bearer credential for one remote call.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

fn default_access_lifetime() -> i64 {
    3600
}

fn default_refresh_lifetime() -> i64 {
    8_726_400
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_access_lifetime")]
    expires_in: i64,
    #[serde(default = "default_refresh_lifetime")]
    x_refresh_token_expires_in: i64,
}

impl TokenResponse {
    fn into_grant(self) -> TokenGrant {
        let now = Utc::now();
        TokenGrant {
            access_token: self.access_token,
            access_token_expires_at: now + Duration::seconds(self.expires_in),
            refresh_token: self.refresh_token,
            refresh_token_expires_at: now + Duration::seconds(self.x_refresh_token_expires_in),
        }
    }
}

pub struct TokenManager {
    http: reqwest::Client,
    connections: Arc<ConnectionRepository>,
    /// One critical section per connection for the refresh path.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Last access token the remote answered 401 for, per connection.
    rejected: Mutex<HashMap<Uuid, String>>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, connections: Arc<ConnectionRepository>) -> Self {
        Self {
            http,
            connections,
            locks: Mutex::new(HashMap::new()),
            rejected: Mutex::new(HashMap::new()),
        }
    }

    /// Records a 401 for `token`: the stored access token is expired and
    /// in-memory copies of the connection stop handing it out.
    pub async fn reject(
        &self,
        connection: &Connection,
        token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.rejected
            .lock()
            .await
            .insert(connection.id, token.as_str().to_string());
        self.connections.expire_access_token(connection.id).await
    }

    async fn usable(
        &self,
        connection: &Connection,
        now: DateTime<Utc>,
    ) -> Option<AccessToken> {
        let token = connection.valid_access_token(now)?;
        let rejected = self.rejected.lock().await;
        if rejected.get(&connection.id).is_some_and(|r| r == token) {
            return None;
        }
        Some(AccessToken(token.to_string()))
    }

    /// `<authorization_endpoint>?client_id&scope&redirect_uri&response_type=code&state`
    pub fn authorization_url(
        &self,
        connection: &Connection,
        state: &str,
        scope: &str,
    ) -> Result<String, SyncError> {
        let mut url = Url::parse(&connection.authorization_endpoint).map_err(|e| {
            SyncError::config(format!(
                "invalid authorization endpoint '{}': {}",
                connection.authorization_endpoint, e
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &connection.client_id)
            .append_pair("scope", scope)
            .append_pair("redirect_uri", &connection.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Returns a usable access token, refreshing it first when expired.
    #[instrument(skip_all, fields(connection_id = %connection.id))]
    pub async fn ensure_valid_token(&self, connection: &Connection) -> Result<AccessToken, SyncError> {
        if let Some(token) = self.usable(connection, Utc::now()).await {
            return Ok(token);
        }

        let lock = self.lock_for(connection.id).await;
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let current = self.connections.get(connection.id).await?;
        let now = Utc::now();
        if let Some(token) = self.usable(&current, now).await {
            return Ok(token);
        }
        if current.refresh_token.is_none() && current.access_token.is_none() {
            return Err(SyncError::config(format!(
                "connection {} has no tokens; complete the authorization flow",
                current.id
            )));
        }
        if current.valid_refresh_token(now).is_none() {
            warn!(connection_id = %current.id, "refresh token expired");
            counter!("qbo_token_refresh_expired_total").increment(1);
            return Err(SyncError::auth(format!(
                "refresh token for connection {} has expired",
                current.id
            )));
        }

        let refreshed = self.refresh_locked(&current).await?;
        refreshed
            .access_token
            .map(AccessToken)
            .ok_or_else(|| SyncError::auth("token endpoint returned no access token"))
    }

    /// Exchanges the code from the redirect callback for the first token pair.
    #[instrument(skip_all, fields(connection_id = %connection.id, realm_id = %realm_id))]
    pub async fn exchange_authorization_code(
        &self,
        connection: &Connection,
        code: &str,
        realm_id: &str,
    ) -> Result<Connection, SyncError> {
        let lock = self.lock_for(connection.id).await;
        let _guard = lock.lock().await;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", connection.redirect_uri.as_str()),
        ];
        let grant = self.request_tokens(connection, &form).await?;
        let updated = self
            .connections
            .store_authorization(connection.id, code, realm_id, &grant)
            .await?;
        self.rejected.lock().await.remove(&connection.id);

        counter!("qbo_token_exchange_success_total").increment(1);
        info!(connection_id = %connection.id, "authorization code exchanged");
        Ok(updated)
    }

    /// Rotates both tokens. Prior state is untouched if the call fails.
    #[instrument(skip_all, fields(connection_id = %connection.id))]
    pub async fn refresh(&self, connection: &Connection) -> Result<Connection, SyncError> {
        let lock = self.lock_for(connection.id).await;
        let _guard = lock.lock().await;
        let current = self.connections.get(connection.id).await?;
        self.refresh_locked(&current).await
    }

    async fn refresh_locked(&self, connection: &Connection) -> Result<Connection, SyncError> {
        let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
            SyncError::auth(format!("connection {} has no refresh token", connection.id))
        })?;

        counter!("qbo_token_refresh_attempts_total").increment(1);
        let started = std::time::Instant::now();
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let grant = match self.request_tokens(connection, &form).await {
            Ok(grant) => grant,
            Err(err) => {
                counter!("qbo_token_refresh_failure_total").increment(1);
                warn!(connection_id = %connection.id, error = %err, "token refresh failed");
                return Err(err);
            }
        };
        let updated = self.connections.store_tokens(connection.id, &grant).await?;
        self.rejected.lock().await.remove(&connection.id);

        histogram!("qbo_token_refresh_latency_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);
        counter!("qbo_token_refresh_success_total").increment(1);
        info!(
            connection_id = %connection.id,
            access_token_expires_at = %grant.access_token_expires_at,
            "refreshed access token"
        );
        Ok(updated)
    }

    async fn request_tokens(
        &self,
        connection: &Connection,
        form: &[(&str, &str)],
    ) -> Result<TokenGrant, SyncError> {
        let url = connection.token_endpoint.as_str();
        let response = self
            .http
            .post(url)
            .basic_auth(&connection.client_id, Some(&connection.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|source| SyncError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| SyncError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            if status == StatusCode::BAD_REQUEST && body.contains("invalid_grant") {
                return Err(SyncError::auth(format!(
                    "token endpoint rejected the grant: {}",
                    body.chars().take(200).collect::<String>()
                )));
            }
            return Err(SyncError::remote(status, body));
        }

        serde_json::from_str::<TokenResponse>(&body)
            .map(TokenResponse::into_grant)
            .map_err(|e| SyncError::decode(format!("malformed token response: {}", e)))
    }

    async fn lock_for(&self, connection_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
