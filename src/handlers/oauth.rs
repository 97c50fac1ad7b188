//! # OAuth Handlers
//!
//! Starting the interactive authorization flow and receiving its redirect.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::repositories::OAuthStateRepository;
use crate::server::AppState;

/// Minutes an issued `state` value stays redeemable.
pub const OAUTH_STATE_TTL_MINUTES: i64 = 15;

/// Text shown in the browser once the flow completes.
pub const CALLBACK_DONE_MESSAGE: &str = "You can close this window now";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    /// URL the user opens to grant access to their QuickBooks company
    pub authorize_url: String,
}

/// Query parameters appended by the authorization server to the redirect URI
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    pub state: Option<String>,
}

fn new_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}

/// Issue an authorize URL for a connection
#[utoipa::path(
    post,
    path = "/connections/{id}/authorize",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Authorization URL issued", body = AuthorizeUrlResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn authorize(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let connection = state
        .connections
        .find(id)
        .await?
        .ok_or_else(|| not_found("Connection not found"))?;

    let token = new_state_token();
    OAuthStateRepository::new(state.db.clone())
        .create(connection.id, &token, OAUTH_STATE_TTL_MINUTES)
        .await?;

    let authorize_url =
        state
            .tokens
            .authorization_url(&connection, &token, &state.config.qbo.scope)?;
    info!(connection_id = %connection.id, "issued authorization url");
    Ok(Json(AuthorizeUrlResponse { authorize_url }))
}

/// OAuth redirect target
///
/// Consumes the single-use `state`, stores the realm and exchanges the code
/// for the first token pair.
#[utoipa::path(
    get,
    path = "/get_auth_code",
    params(AuthCallbackQuery),
    responses(
        (status = 200, description = "Authorization completed", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing parameters or unknown/expired state", body = ApiError),
        (status = 502, description = "Token exchange failed", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn get_auth_code(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
) -> Result<Response, ApiError> {
    let (Some(code), Some(realm_id), Some(state_token)) = (
        query.code.filter(|c| !c.is_empty()),
        query.realm_id.filter(|r| !r.is_empty()),
        query.state.filter(|s| !s.is_empty()),
    ) else {
        return Err(validation_error(
            "code, realmId and state are required",
            serde_json::json!({"required": ["code", "realmId", "state"]}),
        ));
    };

    let Some(issued) = OAuthStateRepository::new(state.db.clone())
        .find_and_consume(&state_token)
        .await?
    else {
        warn!("authorization callback with unknown or expired state");
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_STATE",
            "Authorization state is unknown or expired",
        ));
    };

    let connection = state
        .connections
        .find(issued.connection_id)
        .await?
        .ok_or_else(|| not_found("Connection not found"))?;

    state
        .tokens
        .exchange_authorization_code(&connection, &code, &realm_id)
        .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        CALLBACK_DONE_MESSAGE,
    )
        .into_response())
}
