//! # Import and Export Handlers
//!
//! Operator triggers for one import page or one record export.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::qbo::ImportStream;
use crate::server::AppState;
use crate::sync::{ExportOutcome, ImportOutcome};

/// Import the next page of one stream
#[utoipa::path(
    post,
    path = "/connections/{id}/import/{stream}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Connection id"),
        ("stream" = String, Path, description = "Stream name, e.g. `customer`, `category`, `bill_payment`")
    ),
    responses(
        (status = 200, description = "Page imported", body = ImportOutcome),
        (status = 400, description = "Unknown stream", body = ApiError),
        (status = 401, description = "Operator token invalid, or QuickBooks re-authorization required", body = ApiError),
        (status = 409, description = "Local data violates a dedup invariant", body = ApiError),
        (status = 412, description = "Connection is not authorized yet", body = ApiError),
        (status = 502, description = "QuickBooks returned an error", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn import_stream(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path((id, stream)): Path<(Uuid, String)>,
) -> Result<Json<ImportOutcome>, ApiError> {
    let stream: ImportStream = stream.parse().map_err(|e: crate::qbo::entity::UnknownImportStream| {
        validation_error(
            &e.to_string(),
            json!({ "streams": ImportStream::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>() }),
        )
    })?;
    state
        .connections
        .find(id)
        .await?
        .ok_or_else(|| not_found("Connection not found"))?;

    let outcome = state.sync.import_page(id, stream).await?;
    Ok(Json(outcome))
}

/// Export one local record
#[utoipa::path(
    post,
    path = "/connections/{id}/export/{record_id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Connection id"),
        ("record_id" = Uuid, Path, description = "Local record id")
    ),
    responses(
        (status = 200, description = "Record exported", body = ExportOutcome),
        (status = 401, description = "Operator token invalid, or QuickBooks re-authorization required", body = ApiError),
        (status = 404, description = "Connection or record not found", body = ApiError),
        (status = 422, description = "Record or one of its references cannot be exported", body = ApiError),
        (status = 502, description = "QuickBooks returned an error", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn export_record(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path((id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ExportOutcome>, ApiError> {
    state
        .connections
        .find(id)
        .await?
        .ok_or_else(|| not_found("Connection not found"))?;
    state
        .sync
        .ledger_for(id)
        .get(record_id)
        .await?
        .ok_or_else(|| not_found("Record not found"))?;

    let outcome = state.sync.export_record(id, record_id).await?;
    Ok(Json(outcome))
}
