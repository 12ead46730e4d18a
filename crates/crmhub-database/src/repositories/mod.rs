//! PostgreSQL repository implementations.

pub mod saved_filter;

pub use saved_filter::PgSavedFilterRepository;
