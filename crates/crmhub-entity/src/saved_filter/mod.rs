//! Saved filter entity.

pub mod model;

pub use model::{CreateSavedFilter, SavedFilter, UpdateSavedFilter};
