//! Saved filters and rule source resolution.

pub mod service;
pub mod source;

pub use service::{SaveFilterRequest, SavedFilterService};
pub use source::{RuleSourceRequest, resolve_rule_source};
