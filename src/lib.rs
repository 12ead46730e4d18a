//! # crmhub
//!
//! Dynamic filter-rule compiler for CRM listings. This facade re-exports
//! the workspace crates:
//!
//! - [`query`]: rule trees, filter descriptors, parsers, criteria, the SQL
//!   grammar and the in-memory engine
//! - [`service`]: saved filters, rule source resolution and listing queries
//! - [`database`]: saved filter storage
//! - [`entity`] and [`common`]: shared models, configuration and errors

pub use crmhub_core as common;
pub use crmhub_database as database;
pub use crmhub_entity as entity;
pub use crmhub_query as query;
pub use crmhub_service as service;

pub use crmhub_core::error::{AppError, ErrorKind};
pub use crmhub_core::result::AppResult;
pub use crmhub_query::{CompileContext, Criteria, FilterSet, Query, RuleTree, SchemaRegistry};
pub use crmhub_service::{ListingService, RequestContext, ResourceCatalog, SavedFilterService};
