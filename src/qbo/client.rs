//! # QuickBooks Remote Client
//!
//! Authenticated transport over the company REST API. Every call obtains a
//! bearer token through the [`TokenManager`], sends JSON, and normalizes the
//! response through [`decode::normalize`](super::decode::normalize) so callers
//! never see whether the server answered in JSON or XML.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::connection::Connection;
use super::decode;
use super::entity::RemoteEntity;
use super::payload::{CreatePayload, SparseUpdate, UpdateFields};
use super::records::{SyncTokenRow, query_rows, single_row};
use super::token_manager::TokenManager;
use crate::error::SyncError;

/// Read and write access to one company's entities.
pub struct QboClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
}

impl QboClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenManager>) -> Self {
        Self { http, tokens }
    }

    /// Runs a query statement and returns the matching rows of `entity`.
    ///
    /// Pagination is expressed inside the statement (`Id > '<cursor>' order by Id`).
    #[instrument(skip_all, fields(connection_id = %connection.id, entity = %entity))]
    pub async fn query(
        &self,
        connection: &Connection,
        entity: RemoteEntity,
        statement: &str,
    ) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/query", connection.company_url()?);
        let params = [
            ("query", statement),
            ("minorversion", connection.minor_version.as_str()),
        ];
        let body = self
            .send(connection, Method::GET, &url, &params, None::<&()>, "query")
            .await?;
        let rows = query_rows(entity, body);
        debug!(rows = rows.len(), "query returned");
        Ok(rows)
    }

    #[instrument(skip_all, fields(connection_id = %connection.id, entity = %entity, remote_id = %id))]
    pub async fn get_by_id(
        &self,
        connection: &Connection,
        entity: RemoteEntity,
        id: &str,
    ) -> Result<Value, SyncError> {
        let url = format!("{}/{}/{}", connection.company_url()?, entity.resource(), id);
        let params = [("minorversion", connection.minor_version.as_str())];
        let body = self
            .send(connection, Method::GET, &url, &params, None::<&()>, entity.resource())
            .await?;
        single_row(entity, body)
    }

    /// Creates a new remote entity and returns it as stored by the server.
    #[instrument(skip_all, fields(connection_id = %connection.id, entity = %payload.entity()))]
    pub async fn create(
        &self,
        connection: &Connection,
        payload: &CreatePayload,
    ) -> Result<Value, SyncError> {
        let entity = payload.entity();
        let url = format!("{}/{}", connection.company_url()?, entity.resource());
        let params = [("minorversion", connection.export_minor_version.as_str())];
        let body = self
            .send(connection, Method::POST, &url, &params, Some(payload), entity.resource())
            .await?;
        single_row(entity, body)
    }

    /// Sparse update echoing `sync_token`; only the supplied fields change.
    #[instrument(skip_all, fields(connection_id = %connection.id, entity = %fields.entity(), remote_id = %id))]
    pub async fn update(
        &self,
        connection: &Connection,
        id: &str,
        sync_token: &str,
        fields: &UpdateFields,
    ) -> Result<Value, SyncError> {
        let entity = fields.entity();
        let url = format!("{}/{}", connection.company_url()?, entity.resource());
        let params = [
            ("operation", "update"),
            ("minorversion", connection.export_minor_version.as_str()),
        ];
        let payload = SparseUpdate::new(id, sync_token, fields);
        let body = self
            .send(connection, Method::POST, &url, &params, Some(&payload), entity.resource())
            .await?;
        single_row(entity, body)
    }

    /// Current sync token of a remote entity, read right before an update.
    pub async fn fetch_sync_token(
        &self,
        connection: &Connection,
        entity: RemoteEntity,
        id: &str,
    ) -> Result<String, SyncError> {
        if !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(SyncError::integrity(format!(
                "external id '{}' of {} is not a remote id",
                id, entity
            )));
        }
        let statement = format!(
            "select Id,SyncToken from {} where Id = '{}'",
            entity.name(),
            id
        );
        let row = self
            .query(connection, entity, &statement)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SyncError::integrity(format!("{} {} no longer exists remotely", entity, id))
            })?;
        let row: SyncTokenRow = serde_json::from_value(row)
            .map_err(|e| SyncError::decode(format!("malformed sync token row: {}", e)))?;
        Ok(row.sync_token)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        connection: &Connection,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        body: Option<&B>,
        resource: &'static str,
    ) -> Result<Value, SyncError> {
        let token = self.tokens.ensure_valid_token(connection).await?;

        let mut request = self
            .http
            .request(method, url)
            .query(params)
            .bearer_auth(token.as_str())
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let result = request.send().await;
        histogram!("qbo_remote_request_latency_ms", "resource" => resource)
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        let response = result.map_err(|source| SyncError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|source| SyncError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            counter!("qbo_remote_request_failure_total", "resource" => resource).increment(1);
            if status == StatusCode::UNAUTHORIZED {
                // The stored token is stale; the next call refreshes it.
                warn!(connection_id = %connection.id, "remote rejected access token");
                self.tokens.reject(connection, &token).await?;
            }
            return Err(SyncError::remote(status, text));
        }

        decode::normalize(&text)
    }
}
