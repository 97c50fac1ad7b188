//! HTTP surface: public routes, operator auth, the OAuth redirect callback and
//! the record/export routes, served on a real listener.

use anyhow::{Context, Result as AnyhowResult};
use qbo_connector::{
    handlers::oauth::CALLBACK_DONE_MESSAGE, repositories::OAuthStateRepository,
    server::{AppState, create_app},
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{OPERATOR_TOKEN, REALM_ID, pending_connection, test_state};

struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<AnyhowResult<()>>>,
}

impl TestServerHandle {
    async fn shutdown(mut self) -> AnyhowResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            handle.await.context("server task join failed")??;
        }
        Ok(())
    }
}

async fn spawn_test_app(state: AppState) -> (String, TestServerHandle) {
    let app = create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_url = format!("http://{}", addr);

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        let _ = ready_tx.send(());
        server.await.context("axum server error")
    });

    ready_rx.await.expect("server task to signal readiness");

    (
        server_url,
        TestServerHandle {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(server_task),
        },
    )
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn public_endpoints_need_no_token() {
    let mock = MockServer::start().await;
    let state = test_state(&mock.uri()).await.unwrap();
    let (url, handle) = spawn_test_app(state).await;
    let client = client();

    let response = client.get(format!("{}/", url)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["service"], "qbo-connector");

    let response = client.get(format!("{}/healthz", url)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let response = client
        .get(format!("{}/openapi.json", url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let openapi: Value = response.json().await.unwrap();
    assert!(openapi["paths"]["/connections/{id}/import/{stream}"].is_object());
    assert!(openapi["components"]["securitySchemes"]["bearer_auth"].is_object());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn operator_routes_reject_missing_and_wrong_tokens() {
    let mock = MockServer::start().await;
    let state = test_state(&mock.uri()).await.unwrap();
    let (url, handle) = spawn_test_app(state).await;
    let client = client();
    let target = format!("{}/connections/{}", url, Uuid::new_v4());

    let response = client.get(&target).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = client
        .get(&target)
        .bearer_auth("not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(&target)
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn create_connection_then_authorize_returns_redirect_url() {
    let mock = MockServer::start().await;
    let state = test_state(&mock.uri()).await.unwrap();
    let (url, handle) = spawn_test_app(state).await;
    let client = client();

    let response = client
        .post(format!("{}/connections", url))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&json!({
            "display_name": "Acme Books",
            "client_id": "client-id",
            "client_secret": "client-secret",
            "country_code": "us"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["country_code"], "US");
    assert_eq!(created["has_access_token"], false);
    assert!(created.get("client_secret").is_none());
    let id = created["id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/connections/{}/authorize", url, id))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let authorize_url = url::Url::parse(body["authorize_url"].as_str().unwrap()).unwrap();
    assert_eq!(authorize_url.path(), "/connect/oauth2");
    assert!(
        authorize_url
            .query_pairs()
            .any(|(k, v)| k == "state" && v.len() >= 43)
    );

    let response = client
        .post(format!("{}/connections", url))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&json!({"display_name": " ", "client_id": "c", "client_secret": "s"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn callback_requires_code_realm_and_state() {
    let mock = MockServer::start().await;
    let state = test_state(&mock.uri()).await.unwrap();
    let (url, handle) = spawn_test_app(state).await;

    let response = client()
        .get(format!("{}/get_auth_code?code=abc&state=xyz", url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_FAILED");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn callback_with_unknown_state_is_rejected() {
    let mock = MockServer::start().await;
    let state = test_state(&mock.uri()).await.unwrap();
    let (url, handle) = spawn_test_app(state).await;

    let response = client()
        .get(format!(
            "{}/get_auth_code?code=abc&realmId={}&state=never-issued",
            url, REALM_ID
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_STATE");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn callback_exchanges_code_and_state_cannot_be_replayed() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v1/tokens/bearer"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "x_refresh_token_expires_in": 8726400
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let state = test_state(&mock.uri()).await.unwrap();
    let conn = pending_connection(&state).await.unwrap();
    OAuthStateRepository::new(state.db.clone())
        .create(conn.id, "issued-state", 15)
        .await
        .unwrap();
    let connections = state.connections.clone();
    let (url, handle) = spawn_test_app(state).await;
    let callback = format!(
        "{}/get_auth_code?code=abc&realmId={}&state=issued-state",
        url, REALM_ID
    );

    let response = client().get(&callback).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), CALLBACK_DONE_MESSAGE);

    let stored = connections.get(conn.id).await.unwrap();
    assert_eq!(stored.realm_id.as_deref(), Some(REALM_ID));
    assert_eq!(stored.access_token.as_deref(), Some("access-1"));

    let replay = client().get(&callback).send().await.unwrap();
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn records_are_created_read_and_exported_over_http() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(test_utils::company_path("paymentmethod")))
        .and(body_string_contains("\"Type\":\"CREDIT_CARD\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PaymentMethod": {"Id": "5", "Name": "Visa", "Type": "CREDIT_CARD"}
        })))
        .expect(1)
        .mount(&mock)
        .await;

    let state = test_state(&mock.uri()).await.unwrap();
    let conn = test_utils::authorized_connection(&state).await.unwrap();
    let (url, handle) = spawn_test_app(state).await;
    let client = client();

    let response = client
        .post(format!("{}/connections/{}/records", url, conn.id))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&json!({
            "name": "Visa",
            "state": "open",
            "fields": {"kind": "payment_method", "method_type": "CREDIT_CARD"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let record: Value = response.json().await.unwrap();
    assert_eq!(record["kind"], "payment_method");
    let record_id = record["id"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/connections/{}/export/{}", url, conn.id, record_id))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome, json!({"result": "created", "external_id": "5"}));

    let response = client
        .get(format!("{}/connections/{}/records/{}", url, conn.id, record_id))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    let stored: Value = response.json().await.unwrap();
    assert_eq!(stored["exported"], true);
    assert_eq!(stored["external_ref"]["id"], "5");

    let response = client
        .post(format!("{}/connections/{}/import/ledger", url, conn.id))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/connections/{}/records", url, conn.id))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&json!({"name": "x", "state": "open", "fields": {"kind": "spaceship"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn concurrent_callbacks_redeem_a_state_once() {
    let server = MockServer::start().await;
    let state = test_state(&server.uri()).await.unwrap();
    let conn = pending_connection(&state).await.unwrap();
    let states = OAuthStateRepository::new(state.db.clone());
    states.create(conn.id, "shared-state", 10).await.unwrap();

    let (first, second) = tokio::join!(
        states.find_and_consume("shared-state"),
        states.find_and_consume("shared-state")
    );
    let redeemed = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(redeemed, 1);
    assert!(states.find_and_consume("shared-state").await.unwrap().is_none());
}
