//! # Server Configuration
//!
//! Shared state, router assembly and the serve loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::qbo::{QboClient, TokenManager};
use crate::repositories::ConnectionRepository;
use crate::scheduler::ImportScheduler;
use crate::sync::SyncService;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub connections: Arc<ConnectionRepository>,
    pub tokens: Arc<TokenManager>,
    pub sync: Arc<SyncService>,
}

impl AppState {
    /// Wires repositories, the token manager and the sync service over one pool.
    pub fn new(config: Arc<AppConfig>, db: Arc<DatabaseConnection>) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .context("QBO_CRYPTO_KEY must be configured")?;
        let crypto_key = CryptoKey::new(key_bytes).context("invalid crypto key")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.qbo.http_timeout_seconds))
            .user_agent(concat!("qbo-connector/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let connections = Arc::new(ConnectionRepository::new(db.clone(), crypto_key));
        let tokens = Arc::new(TokenManager::new(http.clone(), connections.clone()));
        let client = Arc::new(QboClient::new(http, tokens.clone()));
        let sync = Arc::new(SyncService::new(
            db.clone(),
            connections.clone(),
            client,
            config.resolver_max_depth,
        ));

        Ok(Self {
            db,
            config,
            connections,
            tokens,
            sync,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/connections", post(handlers::connections::create_connection))
        .route("/connections/{id}", get(handlers::connections::get_connection))
        .route(
            "/connections/{id}/authorize",
            post(handlers::oauth::authorize),
        )
        .route(
            "/connections/{id}/records",
            post(handlers::connections::create_record),
        )
        .route(
            "/connections/{id}/records/{record_id}",
            get(handlers::connections::get_record),
        )
        .route(
            "/connections/{id}/import/{stream}",
            post(handlers::sync::import_stream),
        )
        .route(
            "/connections/{id}/export/{record_id}",
            post(handlers::sync::export_record),
        )
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/get_auth_code", get(handlers::oauth::get_auth_code))
        .merge(operator_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
}

/// Serves the API, and the import scheduler when enabled, until ctrl-c.
pub async fn run_server(config: Arc<AppConfig>, db: Arc<DatabaseConnection>) -> anyhow::Result<()> {
    let state = AppState::new(config.clone(), db)?;
    let shutdown = CancellationToken::new();

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = ImportScheduler::new(
            config.scheduler.clone(),
            state.connections.clone(),
            state.sync.clone(),
        );
        let token = shutdown.clone();
        Some(tokio::spawn(async move { scheduler.run(token).await }))
    } else {
        None
    };

    let addr = config.bind_addr().context("invalid QBO_API_BIND_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "server listening");

    let signal = shutdown.clone();
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::oauth::authorize,
        crate::handlers::oauth::get_auth_code,
        crate::handlers::connections::create_connection,
        crate::handlers::connections::get_connection,
        crate::handlers::connections::create_record,
        crate::handlers::connections::get_record,
        crate::handlers::sync::import_stream,
        crate::handlers::sync::export_record,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::oauth::AuthorizeUrlResponse,
            crate::handlers::connections::CreateConnectionRequest,
            crate::handlers::connections::ConnectionInfo,
            crate::handlers::connections::RecordBody,
            crate::handlers::connections::RecordInfo,
            crate::sync::ImportOutcome,
            crate::sync::ExportOutcome,
            crate::qbo::ImportStream,
            crate::qbo::RemoteEntity,
            crate::ledger::ExternalRef,
            crate::error::ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "QuickBooks Online Connector API",
        description = "OAuth, import and export operations against QuickBooks Online companies",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
