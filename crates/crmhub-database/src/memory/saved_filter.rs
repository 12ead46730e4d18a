//! In-memory saved filter store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::RwLock;
use tracing::debug;

use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;
use crmhub_core::types::{SavedFilterId, UserId};
use crmhub_entity::{CreateSavedFilter, SavedFilter, UpdateSavedFilter};

use crate::store::SavedFilterStore;

#[derive(Debug, Default)]
struct InnerState {
    next_id: i64,
    filters: BTreeMap<SavedFilterId, SavedFilter>,
}

/// Saved filters held in a `tokio::sync::RwLock`.
///
/// Behaves like the PostgreSQL repository, including the single default
/// per (identifier, view, owner).
#[derive(Debug, Clone, Default)]
pub struct MemorySavedFilterStore {
    state: Arc<RwLock<InnerState>>,
}

impl MemorySavedFilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.filters.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn not_found(id: SavedFilterId) -> AppError {
    AppError::not_found(format!("Saved filter {id} not found"))
}

#[async_trait]
impl SavedFilterStore for MemorySavedFilterStore {
    async fn find(&self, id: SavedFilterId) -> AppResult<Option<SavedFilter>> {
        Ok(self.state.read().await.filters.get(&id).cloned())
    }

    async fn find_visible(&self, id: SavedFilterId, user: UserId) -> AppResult<Option<SavedFilter>> {
        let state = self.state.read().await;
        Ok(state.filters.get(&id).filter(|filter| filter.is_visible_to(user)).cloned())
    }

    async fn find_default(&self, identifier: &str, view: &str, user: UserId) -> AppResult<Option<SavedFilter>> {
        let state = self.state.read().await;
        let mut defaults: Vec<&SavedFilter> = state
            .filters
            .values()
            .filter(|filter| {
                filter.is_default
                    && filter.identifier == identifier
                    && filter.view == view
                    && filter.is_visible_to(user)
            })
            .collect();
        defaults.sort_by_key(|filter| filter.is_system());
        Ok(defaults.first().map(|filter| (*filter).clone()))
    }

    async fn list_visible(&self, identifier: &str, user: UserId) -> AppResult<Vec<SavedFilter>> {
        let state = self.state.read().await;
        let mut filters: Vec<SavedFilter> = state
            .filters
            .values()
            .filter(|filter| filter.identifier == identifier && filter.is_visible_to(user))
            .cloned()
            .collect();
        filters.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(filters)
    }

    async fn create(&self, data: &CreateSavedFilter) -> AppResult<SavedFilter> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let now = Utc::now();
        let filter = SavedFilter {
            id: SavedFilterId(state.next_id),
            user_id: data.user_id,
            name: data.name.clone(),
            identifier: data.identifier.clone(),
            view: data.view.clone(),
            rules: Json(data.rules.clone()),
            is_default: false,
            is_readonly: data.is_readonly,
            is_system_default: data.is_system_default,
            created_at: now,
            updated_at: now,
        };
        state.filters.insert(filter.id, filter.clone());
        Ok(filter)
    }

    async fn update(&self, id: SavedFilterId, data: &UpdateSavedFilter) -> AppResult<SavedFilter> {
        let mut state = self.state.write().await;
        let filter = state.filters.get_mut(&id).ok_or_else(|| not_found(id))?;
        if let Some(name) = &data.name {
            filter.name = name.clone();
        }
        if let Some(rules) = &data.rules {
            filter.rules = Json(rules.clone());
        }
        filter.updated_at = Utc::now();
        Ok(filter.clone())
    }

    async fn delete(&self, id: SavedFilterId) -> AppResult<bool> {
        Ok(self.state.write().await.filters.remove(&id).is_some())
    }

    async fn mark_as_default(&self, id: SavedFilterId) -> AppResult<SavedFilter> {
        let mut state = self.state.write().await;
        let target = state.filters.get(&id).cloned().ok_or_else(|| not_found(id))?;
        let now = Utc::now();

        for filter in state.filters.values_mut() {
            if filter.id != id
                && filter.is_default
                && filter.identifier == target.identifier
                && filter.view == target.view
                && filter.user_id == target.user_id
            {
                debug!(filter_id = %filter.id, "Clearing previous default filter");
                filter.is_default = false;
                filter.updated_at = now;
            }
        }

        let filter = state.filters.get_mut(&id).ok_or_else(|| not_found(id))?;
        filter.is_default = true;
        filter.updated_at = now;
        Ok(filter.clone())
    }

    async fn unmark_default(&self, id: SavedFilterId) -> AppResult<SavedFilter> {
        let mut state = self.state.write().await;
        let filter = state.filters.get_mut(&id).ok_or_else(|| not_found(id))?;
        filter.is_default = false;
        filter.updated_at = Utc::now();
        Ok(filter.clone())
    }
}
