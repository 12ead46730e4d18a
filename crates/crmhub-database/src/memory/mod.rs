//! In-memory store implementations for tests and single-process tools.

pub mod saved_filter;

pub use saved_filter::MemorySavedFilterStore;
