//! # Error Handling
//!
//! [`SyncError`] is the runtime taxonomy shared by the token manager, the
//! remote client and the sync engines. [`ApiError`] is the problem+json
//! surface the HTTP layer renders, with trace ID propagation.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Failures raised while talking to QuickBooks Online or reconciling records.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Refresh token expired, revoked or rejected. Terminal until the
    /// interactive authorization flow runs again.
    #[error("authorization required: {message}")]
    Auth { message: String },
    /// Non-success response from the remote API or token endpoint.
    #[error("[{status}] {reason}")]
    Remote {
        status: u16,
        reason: String,
        body: String,
    },
    /// Transport failure before any HTTP status was received.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Dedup invariant violated or reference resolution overflowed.
    #[error("integrity violation: {message}")]
    Integrity { message: String },
    /// Export needs a remote reference that does not exist yet, or the
    /// document was already exported.
    #[error("{message}")]
    NotExported { message: String },
    /// Connection lacks settings required before any call can be made.
    #[error("connection misconfigured: {message}")]
    Config { message: String },
    /// Response body could not be decoded into the expected shape.
    #[error("failed to decode remote response: {message}")]
    Decode { message: String },
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
    #[error("secret storage error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
}

impl SyncError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    pub fn not_exported(message: impl Into<String>) -> Self {
        Self::NotExported {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Builds a remote error from a non-success status and its raw body.
    pub fn remote(status: StatusCode, body: String) -> Self {
        Self::Remote {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            body,
        }
    }

    /// Whether the caller must re-run the interactive authorization flow.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Extract current trace ID from the task-local context (falls back to a generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        let code = code.as_ref();
        code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code)
    })
}

/// Upstream provider error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderError {
    /// Provider identifier
    pub provider: String,
    /// HTTP status code from upstream
    pub status: u16,
    /// Response body snippet from upstream (truncated for security)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Auth { message } => Self::new(
                StatusCode::UNAUTHORIZED,
                "REAUTHORIZATION_REQUIRED",
                &format!("QuickBooks authorization required: {}", message),
            ),
            SyncError::Remote { status, body, .. } => {
                provider_error("quickbooks".to_string(), status, Some(body))
            }
            SyncError::Transport { url, source } => {
                tracing::warn!(%url, error = %source, "QuickBooks transport failure");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    "QuickBooks could not be reached",
                )
            }
            SyncError::Integrity { message } => {
                Self::new(StatusCode::CONFLICT, "INTEGRITY_VIOLATION", &message)
            }
            SyncError::NotExported { message } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "NOT_EXPORTED", &message)
            }
            SyncError::Config { message } => {
                Self::new(StatusCode::PRECONDITION_FAILED, "CONNECTION_MISCONFIGURED", &message)
            }
            SyncError::Database(db) => db.into(),
            other @ (SyncError::Decode { .. } | SyncError::Crypto(_)) => {
                tracing::error!(error = %other, "sync failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
        }
    }
}

/// Create a provider upstream error
pub fn provider_error(provider: String, status: u16, body: Option<String>) -> ApiError {
    let provider_error = ProviderError {
        provider: provider.clone(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    // Upstream failures always surface as 502 so they are not mistaken for client errors.
    ApiError::new(
        StatusCode::BAD_GATEWAY,
        "PROVIDER_ERROR",
        &format!("Provider {} returned error status {}", provider, status),
    )
    .with_details(json!(provider_error))
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// Create a not found error (404)
pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_with_details() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "bad")
            .with_details(json!({"field": "stream"}));
        assert_eq!(error.details.unwrap()["field"], "stream");
    }

    #[test]
    fn test_content_type_header() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Test error");
        let response = error.into_response();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn test_from_anyhow() {
        let api_error: ApiError = anyhow::anyhow!("Something went wrong").into();
        assert_eq!(api_error.code, Box::from("INTERNAL_SERVER_ERROR"));
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn remote_error_display_carries_status_and_reason() {
        let err = SyncError::remote(StatusCode::BAD_REQUEST, "<Fault/>".into());
        assert_eq!(err.to_string(), "[400] Bad Request");
        match err {
            SyncError::Remote { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body, "<Fault/>");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remote_error_maps_to_provider_error() {
        let api: ApiError = SyncError::remote(StatusCode::UNPROCESSABLE_ENTITY, "x".repeat(500)).into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api.code, Box::from("PROVIDER_ERROR"));
        let details = api.details.unwrap();
        assert_eq!(details["provider"], "quickbooks");
        assert_eq!(details["status"], 422);
        let snippet = details["body_snippet"].as_str().unwrap();
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 203);
    }

    #[test]
    fn sync_error_status_mapping() {
        let cases: Vec<(SyncError, StatusCode, &str)> = vec![
            (
                SyncError::auth("refresh token expired"),
                StatusCode::UNAUTHORIZED,
                "REAUTHORIZATION_REQUIRED",
            ),
            (
                SyncError::integrity("two partners share remote id 5"),
                StatusCode::CONFLICT,
                "INTEGRITY_VIOLATION",
            ),
            (
                SyncError::not_exported("already exported"),
                StatusCode::UNPROCESSABLE_ENTITY,
                "NOT_EXPORTED",
            ),
            (
                SyncError::config("missing realm id"),
                StatusCode::PRECONDITION_FAILED,
                "CONNECTION_MISCONFIGURED",
            ),
            (
                SyncError::decode("not json"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
            ),
        ];

        for (error, status, code) in cases {
            let api: ApiError = error.into();
            assert_eq!(api.status, status);
            assert_eq!(api.code, Box::from(code));
        }
    }

    #[test]
    fn only_auth_errors_require_reauthorization() {
        assert!(SyncError::auth("expired").requires_reauthorization());
        assert!(!SyncError::integrity("dup").requires_reauthorization());
    }

    #[test]
    fn test_utf8_safe_truncation() {
        let test_string = "测试中文字符🚀 multi-byte payload ".repeat(20);
        let error = provider_error("quickbooks".to_string(), 500, Some(test_string));
        let details = error.details.unwrap();
        let body_snippet = details["body_snippet"].as_str().unwrap();
        assert!(body_snippet.chars().count() <= 203);
        assert!(body_snippet.starts_with("测试中文字符🚀"));
    }
}
