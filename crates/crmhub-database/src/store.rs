//! Storage abstraction for saved filters.

use async_trait::async_trait;

use crmhub_core::result::AppResult;
use crmhub_core::types::{SavedFilterId, UserId};
use crmhub_entity::{CreateSavedFilter, SavedFilter, UpdateSavedFilter};

/// Persistence of saved filters.
///
/// A filter is visible to a user when the user owns it or it is a system
/// filter (no owner). At most one filter is the default per
/// (identifier, view, owner); implementations switch the default
/// atomically in [`SavedFilterStore::mark_as_default`].
#[async_trait]
pub trait SavedFilterStore: Send + Sync + 'static {
    async fn find(&self, id: SavedFilterId) -> AppResult<Option<SavedFilter>>;

    /// The filter if `user` may see it.
    async fn find_visible(&self, id: SavedFilterId, user: UserId) -> AppResult<Option<SavedFilter>>;

    /// The user's default for the listing view, else the system default.
    async fn find_default(&self, identifier: &str, view: &str, user: UserId) -> AppResult<Option<SavedFilter>>;

    /// Filters of a listing visible to `user`, ordered by name.
    async fn list_visible(&self, identifier: &str, user: UserId) -> AppResult<Vec<SavedFilter>>;

    async fn create(&self, data: &CreateSavedFilter) -> AppResult<SavedFilter>;

    /// Apply the changed fields. Fails with `NotFound` for unknown ids.
    async fn update(&self, id: SavedFilterId, data: &UpdateSavedFilter) -> AppResult<SavedFilter>;

    /// Delete a filter; returns whether it existed.
    async fn delete(&self, id: SavedFilterId) -> AppResult<bool>;

    /// Make the filter the default of its (identifier, view, owner),
    /// clearing the previous default.
    async fn mark_as_default(&self, id: SavedFilterId) -> AppResult<SavedFilter>;

    async fn unmark_default(&self, id: SavedFilterId) -> AppResult<SavedFilter>;
}
