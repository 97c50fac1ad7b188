//! # Synchronization Core
//!
//! Import and export entry points. [`SyncService`] wires a connection's
//! ledger, the remote client and the cursor store into the engines for one
//! unit of work at a time.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod cursor;
pub mod export;
pub mod resolver;
pub mod upsert;

pub use cursor::{ImportOutcome, Importer, compare_remote_ids};
pub use export::{ExportEngine, ExportOutcome};
pub use resolver::{RecordSink, ReferenceResolver};
pub use upsert::{EntityUpsertEngine, UpsertOutcome};

use crate::error::SyncError;
use crate::ledger::{Ledger, SeaOrmLedger};
use crate::qbo::{Connection, ImportStream, QboClient};
use crate::repositories::{ConnectionRepository, ImportCursorRepository};

pub struct SyncService {
    db: Arc<DatabaseConnection>,
    connections: Arc<ConnectionRepository>,
    client: Arc<QboClient>,
    importer: Importer,
    max_depth: usize,
}

impl SyncService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        connections: Arc<ConnectionRepository>,
        client: Arc<QboClient>,
        max_depth: usize,
    ) -> Self {
        let importer = Importer::new(ImportCursorRepository::new(db.clone()), client.clone());
        Self {
            db,
            connections,
            client,
            importer,
            max_depth,
        }
    }

    pub fn ledger_for(&self, connection_id: Uuid) -> Arc<dyn Ledger> {
        Arc::new(SeaOrmLedger::new(self.db.clone(), connection_id))
    }

    fn resolver(&self, ledger: Arc<dyn Ledger>, connection: &Connection) -> ReferenceResolver {
        ReferenceResolver::new(ledger, self.client.clone(), connection.clone(), self.max_depth)
    }

    /// Imports the next page of `stream` for one connection.
    pub async fn import_page(
        &self,
        connection_id: Uuid,
        stream: ImportStream,
    ) -> Result<ImportOutcome, SyncError> {
        let connection = self.connections.get(connection_id).await?;
        self.import_connection_page(&connection, stream).await
    }

    async fn import_connection_page(
        &self,
        connection: &Connection,
        stream: ImportStream,
    ) -> Result<ImportOutcome, SyncError> {
        let ledger = self.ledger_for(connection.id);
        let engine = EntityUpsertEngine::new(ledger.clone(), self.resolver(ledger, connection));
        self.importer.import_page(connection, &engine, stream).await
    }

    /// One page of every stream in dependency order. A failing stream is
    /// logged and skipped; an authorization failure ends the pass.
    pub async fn import_all(&self, connection: &Connection) -> Vec<ImportOutcome> {
        let mut outcomes = Vec::new();
        for stream in ImportStream::ALL {
            match self.import_connection_page(connection, stream).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) if err.requires_reauthorization() => {
                    warn!(
                        connection_id = %connection.id,
                        error = %err,
                        "connection needs re-authorization; skipping remaining streams"
                    );
                    break;
                }
                Err(err) => {
                    error!(
                        connection_id = %connection.id,
                        stream = %stream,
                        error = %err,
                        "stream import failed"
                    );
                }
            }
        }
        outcomes
    }

    /// Exports one local record of a connection.
    pub async fn export_record(
        &self,
        connection_id: Uuid,
        record_id: Uuid,
    ) -> Result<ExportOutcome, SyncError> {
        let connection = self.connections.get(connection_id).await?;
        let ledger = self.ledger_for(connection.id);
        let record = ledger.require(record_id).await?;
        let engine = ExportEngine::new(
            ledger.clone(),
            self.client.clone(),
            self.resolver(ledger, &connection),
        );
        let outcome = engine.export(&record).await?;
        info!(connection_id = %connection_id, record_id = %record_id, "export finished");
        Ok(outcome)
    }
}
