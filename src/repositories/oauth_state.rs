//! # OAuth State Repository
//!
//! Single-use `state` values tying the redirect callback back to a connection.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, ActiveModel, Entity, Model};

pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores a state token for `connection_id` valid for `expires_in_minutes`.
    pub async fn create(
        &self,
        connection_id: Uuid,
        state: &str,
        expires_in_minutes: i64,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();
        ActiveModel {
            id: Set(Uuid::new_v4()),
            connection_id: Set(connection_id),
            state: Set(state.to_string()),
            expires_at: Set((now + Duration::minutes(expires_in_minutes)).fixed_offset()),
            created_at: Set(now.fixed_offset()),
        }
        .insert(&*self.db)
        .await
    }

    /// Looks up an unexpired state and deletes it so it cannot be replayed.
    pub async fn find_and_consume(&self, state: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        let found = Entity::find()
            .filter(oauth_state::Column::State.eq(state))
            .one(&*self.db)
            .await?;

        let Some(model) = found else {
            return Ok(None);
        };

        // A concurrent callback that deleted the row first owns the state.
        let deleted = Entity::delete_by_id(model.id).exec(&*self.db).await?;
        if deleted.rows_affected == 0 {
            tracing::debug!(connection_id = %model.connection_id, "oauth state already consumed");
            return Ok(None);
        }

        if model.expires_at.to_utc() <= Utc::now() {
            tracing::debug!(connection_id = %model.connection_id, "discarded expired oauth state");
            return Ok(None);
        }
        Ok(Some(model))
    }
}
