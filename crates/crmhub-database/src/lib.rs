//! # crmhub-database
//!
//! PostgreSQL connection management, migrations, and the storage of saved
//! filters. [`SavedFilterStore`] abstracts the storage so services can run
//! against PostgreSQL or the in-memory store.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemorySavedFilterStore;
pub use repositories::PgSavedFilterRepository;
pub use store::SavedFilterStore;
