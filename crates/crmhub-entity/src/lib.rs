//! # crmhub-entity
//!
//! Persisted entity models for CRMHub. Every struct in this crate
//! represents a database table row or a write payload for one. Row types
//! additionally derive `sqlx::FromRow`.

pub mod saved_filter;

pub use saved_filter::{CreateSavedFilter, SavedFilter, UpdateSavedFilter};
