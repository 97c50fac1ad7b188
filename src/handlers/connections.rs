//! # Connection Handlers
//!
//! Registering QuickBooks companies, reading their redacted state, and
//! managing the local records the export routes operate on.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::ledger::{ExternalRef, LedgerRecord, NewRecord, RecordFields, RecordKind, RecordState};
use crate::qbo::Connection;
use crate::repositories::NewConnection;
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConnectionRequest {
    pub display_name: String,
    pub client_id: String,
    pub client_secret: String,
    /// Overrides the configured default when present
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub redirect_uri: Option<String>,
    pub api_base_url: Option<String>,
    /// ISO country of the company; `US` switches invoice tax codes to TAX/NON
    pub country_code: Option<String>,
}

/// Connection as exposed over the API. Secrets are never returned.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub display_name: String,
    pub client_id: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub realm_id: Option<String>,
    pub country_code: Option<String>,
    #[schema(default = false, example = true)]
    pub has_access_token: bool,
    #[schema(default = false, example = true)]
    pub has_refresh_token: bool,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}

impl From<Connection> for ConnectionInfo {
    fn from(connection: Connection) -> Self {
        Self {
            id: connection.id,
            display_name: connection.display_name,
            client_id: connection.client_id,
            authorization_endpoint: connection.authorization_endpoint,
            token_endpoint: connection.token_endpoint,
            redirect_uri: connection.redirect_uri,
            api_base_url: connection.api_base_url,
            realm_id: connection.realm_id,
            country_code: connection.country_code,
            has_access_token: connection.access_token.is_some(),
            has_refresh_token: connection.refresh_token.is_some(),
            access_token_expires_at: connection.access_token_expires_at,
            refresh_token_expires_at: connection.refresh_token_expires_at,
        }
    }
}

/// Register a QuickBooks company
#[utoipa::path(
    post,
    path = "/connections",
    security(("bearer_auth" = [])),
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Connection created", body = ConnectionInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn create_connection(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionInfo>), ApiError> {
    let mut missing = Vec::new();
    for (field, value) in [
        ("display_name", &request.display_name),
        ("client_id", &request.client_id),
        ("client_secret", &request.client_secret),
    ] {
        if value.trim().is_empty() {
            missing.push(field);
        }
    }
    if !missing.is_empty() {
        return Err(validation_error(
            "required fields are empty",
            serde_json::json!({ "fields": missing }),
        ));
    }

    let connection = state
        .connections
        .create(
            NewConnection {
                display_name: request.display_name,
                client_id: request.client_id,
                client_secret: request.client_secret,
                authorization_endpoint: request.authorization_endpoint,
                token_endpoint: request.token_endpoint,
                redirect_uri: request.redirect_uri,
                api_base_url: request.api_base_url,
                country_code: request.country_code,
            },
            &state.config.qbo,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(connection.into())))
}

/// Read a connection
#[utoipa::path(
    get,
    path = "/connections/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Connection", body = ConnectionInfo),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn get_connection(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    let connection = state
        .connections
        .find(id)
        .await?
        .ok_or_else(|| not_found("Connection not found"))?;
    Ok(Json(connection.into()))
}

/// Local record as seen by the export routes
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordBody {
    pub name: String,
    pub code: Option<String>,
    #[schema(value_type = Option<String>)]
    pub parent_id: Option<Uuid>,
    #[schema(value_type = String, example = "open")]
    pub state: RecordState,
    /// Kind-tagged attribute set, e.g. `{"kind": "payment_method", "method_type": "CREDIT_CARD"}`
    #[schema(value_type = Object)]
    pub fields: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub kind: RecordKind,
    pub name: String,
    pub code: Option<String>,
    #[schema(value_type = Option<String>)]
    pub parent_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub state: RecordState,
    pub exported: bool,
    pub external_ref: Option<ExternalRef>,
    #[schema(value_type = Object)]
    pub fields: serde_json::Value,
}

impl TryFrom<LedgerRecord> for RecordInfo {
    type Error = ApiError;

    fn try_from(record: LedgerRecord) -> Result<Self, Self::Error> {
        let fields = serde_json::to_value(&record.fields).map_err(anyhow::Error::from)?;
        Ok(Self {
            id: record.id,
            kind: record.kind(),
            name: record.name,
            code: record.code,
            parent_id: record.parent_id,
            state: record.state,
            exported: record.exported,
            external_ref: record.external_ref,
            fields,
        })
    }
}

/// Create a local record
///
/// Records created here carry no external reference; exporting them creates
/// their remote counterpart.
#[utoipa::path(
    post,
    path = "/connections/{id}/records",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Connection id")),
    request_body = RecordBody,
    responses(
        (status = 201, description = "Record created", body = RecordInfo),
        (status = 400, description = "Unknown kind or malformed fields", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "records"
)]
pub async fn create_record(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<RecordBody>,
) -> Result<(StatusCode, Json<RecordInfo>), ApiError> {
    state
        .connections
        .find(id)
        .await?
        .ok_or_else(|| not_found("Connection not found"))?;

    let fields: RecordFields = serde_json::from_value(body.fields).map_err(|e| {
        validation_error(
            "fields do not match any record kind",
            serde_json::json!({ "error": e.to_string() }),
        )
    })?;

    let ledger = state.sync.ledger_for(id);
    let record = ledger
        .create(
            NewRecord::new(body.name, fields)
                .with_code(body.code)
                .with_parent(body.parent_id)
                .with_state(body.state),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record.try_into()?)))
}

/// Read a local record
#[utoipa::path(
    get,
    path = "/connections/{id}/records/{record_id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Connection id"),
        ("record_id" = Uuid, Path, description = "Local record id")
    ),
    responses(
        (status = 200, description = "Record", body = RecordInfo),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Record not found", body = ApiError)
    ),
    tag = "records"
)]
pub async fn get_record(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path((id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RecordInfo>, ApiError> {
    let record = state
        .sync
        .ledger_for(id)
        .get(record_id)
        .await?
        .ok_or_else(|| not_found("Record not found"))?;
    Ok(Json(record.try_into()?))
}
