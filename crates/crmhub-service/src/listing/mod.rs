//! Listing queries: rules, search, ordering and projection for one
//! resource.

mod service;

pub use service::{ExportRequest, ListingRequest, ListingService};
