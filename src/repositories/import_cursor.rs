//! # Import Cursor Repository
//!
//! Reads and writes the per-stream watermark. A missing row reads as `"0"`.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::import_cursor::{self, ActiveModel, Entity};
use crate::qbo::ImportStream;

pub const INITIAL_CURSOR: &str = "0";

#[derive(Clone)]
pub struct ImportCursorRepository {
    db: Arc<DatabaseConnection>,
}

impl ImportCursorRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        connection_id: Uuid,
        stream: ImportStream,
    ) -> Result<String, sea_orm::DbErr> {
        Ok(self
            .find(connection_id, stream)
            .await?
            .map(|row| row.last_imported_id)
            .unwrap_or_else(|| INITIAL_CURSOR.to_string()))
    }

    pub async fn set(
        &self,
        connection_id: Uuid,
        stream: ImportStream,
        last_imported_id: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();
        match self.find(connection_id, stream).await? {
            Some(row) => {
                let mut active: ActiveModel = row.into();
                active.last_imported_id = Set(last_imported_id.to_string());
                active.updated_at = Set(now);
                active.update(&*self.db).await?;
            }
            None => {
                ActiveModel {
                    id: Set(Uuid::new_v4()),
                    connection_id: Set(connection_id),
                    stream: Set(stream.as_str().to_string()),
                    last_imported_id: Set(last_imported_id.to_string()),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }
        Ok(())
    }

    async fn find(
        &self,
        connection_id: Uuid,
        stream: ImportStream,
    ) -> Result<Option<import_cursor::Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(import_cursor::Column::ConnectionId.eq(connection_id))
            .filter(import_cursor::Column::Stream.eq(stream.as_str()))
            .one(&*self.db)
            .await
    }
}
