//! # crmhub-service
//!
//! Service layer for CRMHub. Resolves which rule tree applies to a listing
//! (inline, saved, or default), compiles it together with search and
//! ordering into a query, and manages saved filters.
//!
//! Services follow constructor injection: storage and the resource catalog
//! are provided at construction time via `Arc` references.

pub mod catalog;
pub mod context;
pub mod filter;
pub mod listing;

pub use catalog::{Resource, ResourceCatalog};
pub use context::RequestContext;
pub use filter::{RuleSourceRequest, SaveFilterRequest, SavedFilterService, resolve_rule_source};
pub use listing::{ExportRequest, ListingRequest, ListingService};
