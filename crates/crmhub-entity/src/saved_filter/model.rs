//! Saved filter entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crmhub_core::types::{SavedFilterId, UserId};

/// A persisted rule tree a user can re-apply on a listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavedFilter {
    /// Unique filter identifier.
    pub id: SavedFilterId,
    /// Owner; `None` for filters shipped by the system.
    pub user_id: Option<UserId>,
    /// Display name.
    pub name: String,
    /// Listing the filter applies to (e.g. `deals`).
    pub identifier: String,
    /// Sub-scope of the listing (e.g. `table`, `export`).
    pub view: String,
    /// Serialized rule tree.
    pub rules: Json<serde_json::Value>,
    /// Whether this is the default filter for (identifier, view, user).
    pub is_default: bool,
    /// Readonly filters cannot be edited or deleted.
    pub is_readonly: bool,
    /// System default filters cannot be edited or deleted.
    pub is_system_default: bool,
    /// When the filter was created.
    pub created_at: DateTime<Utc>,
    /// When the filter was last updated.
    pub updated_at: DateTime<Utc>,
}

impl SavedFilter {
    /// Filters without an owner are shared system filters.
    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }

    /// Whether `user` may see and apply this filter.
    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.user_id.is_none_or(|owner| owner == user)
    }

    /// Whether the filter accepts updates or deletion at all.
    pub fn is_mutable(&self) -> bool {
        !self.is_readonly && !self.is_system_default
    }
}

/// Data required to create a saved filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSavedFilter {
    /// Owner; `None` creates a system filter.
    pub user_id: Option<UserId>,
    /// Display name.
    pub name: String,
    /// Listing the filter applies to.
    pub identifier: String,
    /// Sub-scope of the listing.
    #[serde(default = "default_view")]
    pub view: String,
    /// Serialized rule tree.
    pub rules: serde_json::Value,
    /// Readonly flag.
    #[serde(default)]
    pub is_readonly: bool,
    /// System default flag.
    #[serde(default)]
    pub is_system_default: bool,
}

/// Fields a user may change on an existing saved filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSavedFilter {
    /// New display name.
    pub name: Option<String>,
    /// Replacement rule tree.
    pub rules: Option<serde_json::Value>,
}

fn default_view() -> String {
    "table".to_string()
}
