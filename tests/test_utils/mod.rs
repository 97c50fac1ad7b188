//! Test utilities shared by the integration suites.
//!
//! Every suite runs against an in-memory SQLite database with all migrations
//! applied and a wiremock server standing in for the QuickBooks token
//! endpoint and company API.

use anyhow::Result;
use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use qbo_connector::{
    config::AppConfig,
    qbo::Connection,
    repositories::{NewConnection, TokenGrant},
    server::AppState,
};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::sync::Arc;

pub const OPERATOR_TOKEN: &str = "op-token";
pub const REALM_ID: &str = "9130";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    // One pooled connection: each new in-memory connection is a fresh database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    // Fixtures insert ledger rows for connections they never create.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Configuration for the `test` profile with endpoints pointing at `server_uri`.
#[allow(dead_code)]
pub fn test_config(server_uri: &str) -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        crypto_key: Some(vec![7u8; 32]),
        ..AppConfig::default()
    };
    config.qbo.authorization_endpoint = format!("{}/connect/oauth2", server_uri);
    config.qbo.token_endpoint = format!("{}/oauth2/v1/tokens/bearer", server_uri);
    config.qbo.api_base_url = format!("{}/v3/company/", server_uri);
    config.qbo.http_timeout_seconds = 5;
    config
}

/// Fully wired application state over a fresh database.
#[allow(dead_code)]
pub async fn test_state(server_uri: &str) -> Result<AppState> {
    let db = Arc::new(setup_test_db().await?);
    let config = Arc::new(test_config(server_uri));
    AppState::new(config, db)
}

/// Registers a connection that has not been authorized yet.
#[allow(dead_code)]
pub async fn pending_connection(state: &AppState) -> Result<Connection> {
    let new = NewConnection {
        display_name: "Acme Books".to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        authorization_endpoint: None,
        token_endpoint: None,
        redirect_uri: None,
        api_base_url: None,
        country_code: None,
    };
    Ok(state.connections.create(new, &state.config.qbo).await?)
}

/// Token pair whose access token expires `access_secs` from now (negative for expired).
#[allow(dead_code)]
pub fn grant(access: &str, refresh: &str, access_secs: i64, refresh_secs: i64) -> TokenGrant {
    let now = Utc::now();
    TokenGrant {
        access_token: access.to_string(),
        access_token_expires_at: now + Duration::seconds(access_secs),
        refresh_token: refresh.to_string(),
        refresh_token_expires_at: now + Duration::seconds(refresh_secs),
    }
}

/// Registers and authorizes a connection with a valid access token.
#[allow(dead_code)]
pub async fn authorized_connection(state: &AppState) -> Result<Connection> {
    authorized_connection_with(state, grant("access-1", "refresh-1", 3600, 86_400)).await
}

#[allow(dead_code)]
pub async fn authorized_connection_with(state: &AppState, grant: TokenGrant) -> Result<Connection> {
    let pending = pending_connection(state).await?;
    Ok(state
        .connections
        .store_authorization(pending.id, "auth-code", REALM_ID, &grant)
        .await?)
}

/// `/v3/company/<realm>/<suffix>` as seen by the mock server.
#[allow(dead_code)]
pub fn company_path(suffix: &str) -> String {
    format!("/v3/company/{}/{}", REALM_ID, suffix)
}
