//! Token lifecycle against a mocked token endpoint.

use std::time::Duration;

use std::sync::Arc;

use qbo_connector::error::SyncError;
use qbo_connector::qbo::{QboClient, RemoteEntity};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{authorized_connection_with, company_path, grant, test_state};

const TOKEN_PATH: &str = "/oauth2/v1/tokens/bearer";

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 3600,
        "x_refresh_token_expires_in": 8726400
    })
}

#[tokio::test]
async fn valid_access_token_is_used_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("x", "y")))
        .expect(0)
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    let conn = authorized_connection_with(&state, grant("access-1", "refresh-1", 600, 86_400))
        .await
        .unwrap();

    let token = state.tokens.ensure_valid_token(&conn).await.unwrap();
    assert_eq!(token.as_str(), "access-1");
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2")))
        .expect(1)
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    let conn = authorized_connection_with(&state, grant("access-1", "refresh-1", -10, 86_400))
        .await
        .unwrap();

    let token = state.tokens.ensure_valid_token(&conn).await.unwrap();
    assert_eq!(token.as_str(), "access-2");

    let stored = state.connections.get(conn.id).await.unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("access-2"));
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-2"));
    assert!(stored.access_token_expires_at.unwrap() > chrono::Utc::now());
}

#[tokio::test]
async fn failed_refresh_leaves_stored_tokens_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    let conn = authorized_connection_with(&state, grant("access-1", "refresh-1", -10, 86_400))
        .await
        .unwrap();

    let err = state.tokens.ensure_valid_token(&conn).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote { status: 503, .. }));

    let stored = state.connections.get(conn.id).await.unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("access-1"));
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(stored.refresh_token_expires_at, conn.refresh_token_expires_at);
}

#[tokio::test]
async fn invalid_grant_requires_reauthorization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    let conn = authorized_connection_with(&state, grant("access-1", "refresh-1", -10, 86_400))
        .await
        .unwrap();

    let err = state.tokens.ensure_valid_token(&conn).await.unwrap_err();
    assert!(err.requires_reauthorization());
}

#[tokio::test]
async fn expired_refresh_token_fails_without_calling_the_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("x", "y")))
        .expect(0)
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    let conn = authorized_connection_with(&state, grant("access-1", "refresh-1", -10, -1))
        .await
        .unwrap();

    let err = state.tokens.ensure_valid_token(&conn).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth { .. }));
}

#[tokio::test]
async fn concurrent_callers_share_a_single_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("access-2", "refresh-2"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    let conn = authorized_connection_with(&state, grant("access-1", "refresh-1", -10, 86_400))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        state.tokens.ensure_valid_token(&conn),
        state.tokens.ensure_valid_token(&conn)
    );
    assert_eq!(first.unwrap().as_str(), "access-2");
    assert_eq!(second.unwrap().as_str(), "access-2");
}

#[tokio::test]
async fn authorization_code_exchange_stores_realm_and_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-9", "refresh-9")))
        .expect(1)
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    let pending = test_utils::pending_connection(&state).await.unwrap();
    assert!(pending.realm_id.is_none());

    let updated = state
        .tokens
        .exchange_authorization_code(&pending, "the-code", "4620816365")
        .await
        .unwrap();
    assert_eq!(updated.realm_id.as_deref(), Some("4620816365"));
    assert_eq!(updated.auth_code.as_deref(), Some("the-code"));
    assert_eq!(updated.access_token.as_deref(), Some("access-9"));

    let authorized = state.connections.list_authorized().await.unwrap();
    assert_eq!(authorized.len(), 1);
}

#[tokio::test]
async fn authorization_url_carries_client_scope_and_state() {
    let server = MockServer::start().await;
    let state = test_state(&server.uri()).await.unwrap();
    let conn = test_utils::pending_connection(&state).await.unwrap();

    let url = state
        .tokens
        .authorization_url(&conn, "st4te", "com.intuit.quickbooks.accounting")
        .unwrap();
    let parsed = url::Url::parse(&url).unwrap();
    let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

    assert_eq!(pairs["client_id"], "client-id");
    assert_eq!(pairs["response_type"], "code");
    assert_eq!(pairs["state"], "st4te");
    assert_eq!(pairs["scope"], "com.intuit.quickbooks.accounting");
    assert_eq!(pairs["redirect_uri"], conn.redirect_uri);
}

#[tokio::test]
async fn token_rejected_by_the_api_is_not_reused_from_a_stale_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(company_path("query")))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("AuthenticationFailed"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(company_path("query")))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"QueryResponse": {}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2")))
        .expect(1)
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await.unwrap();
    // Still looks valid in memory for the whole test.
    let conn = authorized_connection_with(&state, grant("access-1", "refresh-1", 3600, 86_400))
        .await
        .unwrap();
    let client = QboClient::new(reqwest::Client::new(), Arc::clone(&state.tokens));
    let statement = "select * from Customer where Id > '0' order by Id";

    let err = client
        .query(&conn, RemoteEntity::Customer, statement)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote { status: 401, .. }));

    let stored = state.connections.get(conn.id).await.unwrap();
    assert!(stored.valid_access_token(chrono::Utc::now()).is_none());

    let rows = client
        .query(&conn, RemoteEntity::Customer, statement)
        .await
        .unwrap();
    assert!(rows.is_empty());
}
