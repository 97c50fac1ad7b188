//! # Reference Resolver
//!
//! Maps remote ids to local record ids. A reference that is unknown locally
//! is fetched from the remote and mapped on demand, together with every
//! reference it carries in turn. Resolution uses an explicit stack: the
//! deepest unresolved ancestor is mapped first, then its child, and so on
//! back to the record that was asked for.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::upsert::UpsertOutcome;
use crate::error::SyncError;
use crate::ledger::{Ledger, LedgerRecord, RecordKind, expect_single};
use crate::qbo::{Connection, QboClient, RemoteEntity, RemoteRecord};

/// Maps a remote record whose references already resolve locally.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn apply(&self, record: &RemoteRecord) -> Result<UpsertOutcome, SyncError>;
}

pub struct ReferenceResolver {
    ledger: Arc<dyn Ledger>,
    client: Arc<QboClient>,
    connection: Connection,
    max_depth: usize,
}

impl ReferenceResolver {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        client: Arc<QboClient>,
        connection: Connection,
        max_depth: usize,
    ) -> Self {
        Self {
            ledger,
            client,
            connection,
            max_depth: max_depth.max(1),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The local record owning `(entity, id)`, if any.
    pub async fn lookup(
        &self,
        entity: RemoteEntity,
        id: &str,
    ) -> Result<Option<LedgerRecord>, SyncError> {
        let matches = self.ledger.find_by_external_ref(entity, id).await?;
        expect_single(matches, format!("{} {}", entity, id))
    }

    /// Local id for a remote reference, importing it (and its ancestors) when missing.
    #[instrument(skip_all, fields(entity = %entity, remote_id = %id))]
    pub async fn resolve_local_id(
        &self,
        entity: RemoteEntity,
        id: &str,
        sink: &dyn RecordSink,
    ) -> Result<Uuid, SyncError> {
        if let Some(existing) = self.lookup(entity, id).await? {
            return Ok(existing.id);
        }

        let mut stack = vec![self.fetch(entity, id).await?];
        let mut resolved = None;

        while let Some(top) = stack.last() {
            let references = top.references();
            let mut pending = None;
            for (ref_entity, ref_id) in references {
                if stack
                    .iter()
                    .any(|r| r.entity() == ref_entity && r.id() == ref_id)
                {
                    return Err(SyncError::integrity(format!(
                        "reference cycle through {} {}",
                        ref_entity, ref_id
                    )));
                }
                if self.lookup(ref_entity, &ref_id).await?.is_none() {
                    pending = Some((ref_entity, ref_id));
                    break;
                }
            }

            match pending {
                Some((ref_entity, ref_id)) => {
                    if stack.len() >= self.max_depth {
                        return Err(SyncError::integrity(format!(
                            "reference chain from {} {} exceeds depth {}",
                            entity, id, self.max_depth
                        )));
                    }
                    stack.push(self.fetch(ref_entity, &ref_id).await?);
                }
                None => {
                    if let Some(record) = stack.pop() {
                        let outcome = sink.apply(&record).await?;
                        let local_id = outcome.local_id().ok_or_else(|| {
                            SyncError::integrity(format!(
                                "{} {} cannot be mapped locally: {}",
                                record.entity(),
                                record.id(),
                                outcome
                            ))
                        })?;
                        debug!(
                            entity = %record.entity(),
                            remote_id = %record.id(),
                            local_id = %local_id,
                            "resolved reference on demand"
                        );
                        resolved = Some(local_id);
                    }
                }
            }
        }

        resolved.ok_or_else(|| SyncError::integrity(format!("{} {} was not resolved", entity, id)))
    }

    /// Resolves every reference in order, stopping at the first failure.
    pub async fn resolve_all(
        &self,
        references: &[(RemoteEntity, String)],
        sink: &dyn RecordSink,
    ) -> Result<Vec<Uuid>, SyncError> {
        let mut ids = Vec::with_capacity(references.len());
        for (entity, id) in references {
            ids.push(self.resolve_local_id(*entity, id, sink).await?);
        }
        Ok(ids)
    }

    /// Remote id stored on a local record, falling back to the parent for
    /// partner address records.
    pub async fn require_external_id(&self, local_id: Uuid, what: &str) -> Result<String, SyncError> {
        let record = self.ledger.require(local_id).await?;
        if let Some(id) = record.external_id() {
            return Ok(id.to_string());
        }
        if record.kind() == RecordKind::Partner {
            if let Some(parent_id) = record.parent_id {
                let parent = self.ledger.require(parent_id).await?;
                if let Some(id) = parent.external_id() {
                    return Ok(id.to_string());
                }
            }
        }
        Err(SyncError::not_exported(format!(
            "{} '{}' is not exported to QBO",
            what, record.name
        )))
    }

    async fn fetch(&self, entity: RemoteEntity, id: &str) -> Result<RemoteRecord, SyncError> {
        let value = self.client.get_by_id(&self.connection, entity, id).await?;
        RemoteRecord::decode(entity, value)
    }
}
