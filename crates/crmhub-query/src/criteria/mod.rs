//! Request-facing orchestrators applying rules, search and ordering to a
//! caller's query.
//!
//! Each criteria appends to the query inside its own parenthesised group
//! and never touches clauses already present, so criteria compose by
//! applying them one after another.

pub mod export;
pub mod filter_rules;
pub mod request;
pub mod table;

use crmhub_core::result::AppResult;

use crate::builder::Query;

pub use export::{ExportCriteria, ExportPeriod};
pub use filter_rules::FilterRulesCriteria;
pub use request::{RequestCriteria, RequestParams, SearchMatch};
pub use table::{TableColumn, TableCriteria};

/// Something that refines a query.
pub trait Criteria {
    fn apply(&self, query: &mut Query) -> AppResult<()>;
}

/// Criteria applied in insertion order.
#[derive(Default)]
pub struct CriteriaStack<'a> {
    items: Vec<Box<dyn Criteria + 'a>>,
}

impl<'a> CriteriaStack<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, criteria: impl Criteria + 'a) -> Self {
        self.items.push(Box::new(criteria));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Criteria for CriteriaStack<'_> {
    fn apply(&self, query: &mut Query) -> AppResult<()> {
        for criteria in &self.items {
            criteria.apply(query)?;
        }
        Ok(())
    }
}

impl<F> Criteria for F
where
    F: Fn(&mut Query) -> AppResult<()>,
{
    fn apply(&self, query: &mut Query) -> AppResult<()> {
        self(query)
    }
}
