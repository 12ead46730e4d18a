//! PostgreSQL saved filter repository.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::info;

use crmhub_core::error::{AppError, ErrorKind};
use crmhub_core::result::AppResult;
use crmhub_core::types::{SavedFilterId, UserId};
use crmhub_entity::{CreateSavedFilter, SavedFilter, UpdateSavedFilter};

use crate::store::SavedFilterStore;

/// Saved filters in the `saved_filters` table.
#[derive(Debug, Clone)]
pub struct PgSavedFilterRepository {
    pool: PgPool,
}

impl PgSavedFilterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn not_found(id: SavedFilterId) -> AppError {
    AppError::not_found(format!("Saved filter {id} not found"))
}

#[async_trait]
impl SavedFilterStore for PgSavedFilterRepository {
    async fn find(&self, id: SavedFilterId) -> AppResult<Option<SavedFilter>> {
        sqlx::query_as::<_, SavedFilter>("SELECT * FROM saved_filters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find saved filter", e))
    }

    async fn find_visible(&self, id: SavedFilterId, user: UserId) -> AppResult<Option<SavedFilter>> {
        sqlx::query_as::<_, SavedFilter>(
            "SELECT * FROM saved_filters WHERE id = $1 AND (user_id = $2 OR user_id IS NULL)",
        )
        .bind(id)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find saved filter", e))
    }

    async fn find_default(&self, identifier: &str, view: &str, user: UserId) -> AppResult<Option<SavedFilter>> {
        sqlx::query_as::<_, SavedFilter>(
            "SELECT * FROM saved_filters \
             WHERE identifier = $1 AND view = $2 AND is_default \
             AND (user_id = $3 OR user_id IS NULL) \
             ORDER BY user_id NULLS LAST LIMIT 1",
        )
        .bind(identifier)
        .bind(view)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find default filter", e))
    }

    async fn list_visible(&self, identifier: &str, user: UserId) -> AppResult<Vec<SavedFilter>> {
        sqlx::query_as::<_, SavedFilter>(
            "SELECT * FROM saved_filters \
             WHERE identifier = $1 AND (user_id = $2 OR user_id IS NULL) \
             ORDER BY name, id",
        )
        .bind(identifier)
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list saved filters", e))
    }

    async fn create(&self, data: &CreateSavedFilter) -> AppResult<SavedFilter> {
        sqlx::query_as::<_, SavedFilter>(
            "INSERT INTO saved_filters (user_id, name, identifier, view, rules, is_readonly, is_system_default) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(data.user_id)
        .bind(&data.name)
        .bind(&data.identifier)
        .bind(&data.view)
        .bind(Json(&data.rules))
        .bind(data.is_readonly)
        .bind(data.is_system_default)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create saved filter", e))
    }

    async fn update(&self, id: SavedFilterId, data: &UpdateSavedFilter) -> AppResult<SavedFilter> {
        sqlx::query_as::<_, SavedFilter>(
            "UPDATE saved_filters SET name = COALESCE($2, name), rules = COALESCE($3, rules), \
             updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(data.name.as_deref())
        .bind(data.rules.as_ref().map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update saved filter", e))?
        .ok_or_else(|| not_found(id))
    }

    async fn delete(&self, id: SavedFilterId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM saved_filters WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete saved filter", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_as_default(&self, id: SavedFilterId) -> AppResult<SavedFilter> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        let filter = sqlx::query_as::<_, SavedFilter>("SELECT * FROM saved_filters WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock saved filter", e))?
            .ok_or_else(|| not_found(id))?;

        let cleared = sqlx::query(
            "UPDATE saved_filters SET is_default = FALSE, updated_at = NOW() \
             WHERE identifier = $1 AND view = $2 AND user_id IS NOT DISTINCT FROM $3 \
             AND is_default AND id <> $4",
        )
        .bind(&filter.identifier)
        .bind(&filter.view)
        .bind(filter.user_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to clear default filter", e))?;

        let updated = sqlx::query_as::<_, SavedFilter>(
            "UPDATE saved_filters SET is_default = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark default filter", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit default switch", e))?;

        info!(
            filter_id = %id,
            identifier = %updated.identifier,
            view = %updated.view,
            cleared = cleared.rows_affected(),
            "Default filter switched"
        );
        Ok(updated)
    }

    async fn unmark_default(&self, id: SavedFilterId) -> AppResult<SavedFilter> {
        sqlx::query_as::<_, SavedFilter>(
            "UPDATE saved_filters SET is_default = FALSE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to unmark default filter", e))?
        .ok_or_else(|| not_found(id))
    }
}
