//! # Connection Repository
//!
//! Persists [`Connection`]s, sealing the client secret and both OAuth tokens
//! with AES-256-GCM before they reach the database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::config::QboDefaults;
use crate::crypto::{CryptoKey, SecretSlot, open_secret, seal_secret};
use crate::error::SyncError;
use crate::models::connection::{self, ActiveModel, Entity, Model};
use crate::qbo::Connection;

/// Input for registering a new QuickBooks company.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub display_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub redirect_uri: Option<String>,
    pub api_base_url: Option<String>,
    pub country_code: Option<String>,
}

/// Tokens issued by one successful exchange or refresh.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish_non_exhaustive()
    }
}

pub struct ConnectionRepository {
    db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

impl ConnectionRepository {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Registers a connection, filling unset endpoints from `defaults`.
    pub async fn create(
        &self,
        new: NewConnection,
        defaults: &QboDefaults,
    ) -> Result<Connection, SyncError> {
        let id = Uuid::new_v4();
        let now = Utc::now().fixed_offset();
        let secret = seal_secret(&self.crypto_key, id, SecretSlot::ClientSecret, &new.client_secret)?;

        let model = ActiveModel {
            id: Set(id),
            display_name: Set(new.display_name),
            client_id: Set(new.client_id),
            client_secret_ciphertext: Set(secret),
            authorization_endpoint: Set(new
                .authorization_endpoint
                .unwrap_or_else(|| defaults.authorization_endpoint.clone())),
            token_endpoint: Set(new
                .token_endpoint
                .unwrap_or_else(|| defaults.token_endpoint.clone())),
            redirect_uri: Set(new
                .redirect_uri
                .unwrap_or_else(|| defaults.redirect_uri.clone())),
            api_base_url: Set(new
                .api_base_url
                .unwrap_or_else(|| defaults.api_base_url.clone())),
            realm_id: Set(None),
            auth_code: Set(None),
            access_token_ciphertext: Set(None),
            access_token_expires_at: Set(None),
            refresh_token_ciphertext: Set(None),
            refresh_token_expires_at: Set(None),
            minor_version: Set(defaults.minor_version.clone()),
            export_minor_version: Set(defaults.export_minor_version.clone()),
            country_code: Set(new.country_code.map(|code| code.to_ascii_uppercase())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        tracing::info!(connection_id = %id, "registered QuickBooks connection");
        self.decrypt(model)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Connection>, SyncError> {
        Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(|model| self.decrypt(model))
            .transpose()
    }

    /// Loads a connection that must exist.
    pub async fn get(&self, id: Uuid) -> Result<Connection, SyncError> {
        self.find(id)
            .await?
            .ok_or_else(|| SyncError::config(format!("connection {} does not exist", id)))
    }

    /// Connections that have completed the authorization flow at least once.
    pub async fn list_authorized(&self) -> Result<Vec<Connection>, SyncError> {
        Entity::find()
            .filter(connection::Column::RealmId.is_not_null())
            .filter(connection::Column::RefreshTokenCiphertext.is_not_null())
            .order_by_asc(connection::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|model| self.decrypt(model))
            .collect()
    }

    /// Persists the outcome of an authorization-code exchange in a single write.
    pub async fn store_authorization(
        &self,
        id: Uuid,
        auth_code: &str,
        realm_id: &str,
        grant: &TokenGrant,
    ) -> Result<Connection, SyncError> {
        let mut active = self.token_update(id, grant)?;
        active.auth_code = Set(Some(auth_code.to_string()));
        active.realm_id = Set(Some(realm_id.to_string()));
        let model = active.update(&*self.db).await?;
        self.decrypt(model)
    }

    /// Replaces both tokens and both expiries in a single write.
    pub async fn store_tokens(&self, id: Uuid, grant: &TokenGrant) -> Result<Connection, SyncError> {
        let model = self.token_update(id, grant)?.update(&*self.db).await?;
        self.decrypt(model)
    }

    /// Marks the access token as expired so the next call refreshes it.
    pub async fn expire_access_token(&self, id: Uuid) -> Result<(), SyncError> {
        let now = Utc::now().fixed_offset();
        ActiveModel {
            id: Set(id),
            access_token_expires_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    fn token_update(&self, id: Uuid, grant: &TokenGrant) -> Result<ActiveModel, SyncError> {
        let access = seal_secret(&self.crypto_key, id, SecretSlot::AccessToken, &grant.access_token)?;
        let refresh =
            seal_secret(&self.crypto_key, id, SecretSlot::RefreshToken, &grant.refresh_token)?;

        Ok(ActiveModel {
            id: Set(id),
            access_token_ciphertext: Set(Some(access)),
            access_token_expires_at: Set(Some(grant.access_token_expires_at.fixed_offset())),
            refresh_token_ciphertext: Set(Some(refresh)),
            refresh_token_expires_at: Set(Some(grant.refresh_token_expires_at.fixed_offset())),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        })
    }

    fn decrypt(&self, model: Model) -> Result<Connection, SyncError> {
        let open = |slot, blob: &[u8]| open_secret(&self.crypto_key, model.id, slot, blob);

        let client_secret = open(SecretSlot::ClientSecret, &model.client_secret_ciphertext)?;
        let access_token = model
            .access_token_ciphertext
            .as_deref()
            .map(|blob| open(SecretSlot::AccessToken, blob))
            .transpose()?;
        let refresh_token = model
            .refresh_token_ciphertext
            .as_deref()
            .map(|blob| open(SecretSlot::RefreshToken, blob))
            .transpose()?;

        Ok(Connection {
            id: model.id,
            display_name: model.display_name,
            client_id: model.client_id,
            client_secret,
            authorization_endpoint: model.authorization_endpoint,
            token_endpoint: model.token_endpoint,
            redirect_uri: model.redirect_uri,
            api_base_url: model.api_base_url,
            realm_id: model.realm_id,
            auth_code: model.auth_code,
            access_token,
            access_token_expires_at: model.access_token_expires_at.map(|at| at.to_utc()),
            refresh_token,
            refresh_token_expires_at: model.refresh_token_expires_at.map(|at| at.to_utc()),
            minor_version: model.minor_version,
            export_minor_version: model.export_minor_version,
            country_code: model.country_code,
        })
    }
}
