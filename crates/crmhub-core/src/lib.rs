//! # crmhub-core
//!
//! Core crate for CRMHub. Contains configuration schemas, typed
//! identifiers, pagination/sorting types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other CRMHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
