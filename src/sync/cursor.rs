//! # Incremental Import
//!
//! One call imports one page of one stream: query everything after the
//! stored cursor, upsert each record, then move the cursor to the highest
//! remote id seen. The cursor is written only after the whole page has been
//! processed, so a failed page is retried in full on the next call and the
//! dedup rules absorb the records that had already been written.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::upsert::{EntityUpsertEngine, UpsertOutcome};
use crate::error::SyncError;
use crate::qbo::{Connection, ImportStream, QboClient, RemoteRecord};
use crate::repositories::ImportCursorRepository;

/// Remote ids are unsigned decimal strings.
pub fn is_remote_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric ordering of two remote ids without overflow: `"10" > "9"`.
pub fn compare_remote_ids(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Per-page counters returned to operators and logged by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImportOutcome {
    pub stream: ImportStream,
    pub cursor_before: String,
    pub cursor_after: String,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl ImportOutcome {
    fn new(stream: ImportStream, cursor: String) -> Self {
        Self {
            stream,
            cursor_before: cursor.clone(),
            cursor_after: cursor,
            fetched: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
        }
    }

    fn tally(&mut self, outcome: &UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created(_) => self.created += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Unchanged(_) => self.unchanged += 1,
            UpsertOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

#[derive(Clone)]
pub struct Importer {
    cursors: ImportCursorRepository,
    client: Arc<QboClient>,
}

impl Importer {
    pub fn new(cursors: ImportCursorRepository, client: Arc<QboClient>) -> Self {
        Self { cursors, client }
    }

    #[instrument(skip_all, fields(connection_id = %connection.id, stream = %stream))]
    pub async fn import_page(
        &self,
        connection: &Connection,
        engine: &EntityUpsertEngine,
        stream: ImportStream,
    ) -> Result<ImportOutcome, SyncError> {
        let cursor = self.cursors.get(connection.id, stream).await?;
        if !is_remote_id(&cursor) {
            return Err(SyncError::integrity(format!(
                "stored cursor '{}' for stream {} is not a remote id",
                cursor, stream
            )));
        }

        let entity = stream.remote();
        let rows = self
            .client
            .query(connection, entity, &stream.query(&cursor))
            .await?;

        let mut outcome = ImportOutcome::new(stream, cursor);
        outcome.fetched = rows.len();

        for row in rows {
            let record = RemoteRecord::decode(entity, row)?;

            let result = match (&record, stream) {
                (RemoteRecord::Item(item), ImportStream::Product) if item.is_category() => {
                    UpsertOutcome::Skipped {
                        reason: "categories are imported by their own stream".to_string(),
                    }
                }
                (_, ImportStream::Inventory) => engine.sync_inventory(&record).await?,
                _ => engine.upsert(&record).await?,
            };
            outcome.tally(&result);

            // Symbolic ids such as US tax codes never move the cursor.
            if is_remote_id(record.id())
                && compare_remote_ids(record.id(), &outcome.cursor_after) == Ordering::Greater
            {
                outcome.cursor_after = record.id().to_string();
            }
        }

        if outcome.cursor_after != outcome.cursor_before {
            self.cursors
                .set(connection.id, stream, &outcome.cursor_after)
                .await?;
        }

        info!(
            cursor_before = %outcome.cursor_before,
            cursor_after = %outcome.cursor_after,
            fetched = outcome.fetched,
            created = outcome.created,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "imported page"
        );
        Ok(outcome)
    }
}
