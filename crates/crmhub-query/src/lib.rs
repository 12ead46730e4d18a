//! # crmhub-query
//!
//! The dynamic filter-rule compiler. Turns client supplied rule trees,
//! free-text search requests and ordering instructions into predicates on
//! a storage-neutral [`Query`] builder, which can then be rendered to SQL
//! with [`SqlGrammar`] or executed by the in-memory [`MemoryDatabase`].
//!
//! Compilation is synchronous and pure: everything time or user dependent
//! comes in through a [`CompileContext`].

pub mod builder;
pub mod context;
pub mod criteria;
pub mod dates;
pub mod error;
pub mod filters;
pub mod memory;
pub mod parser;
pub mod rules;
pub mod schema;
pub mod value;

pub use builder::{Boolean, Column, CompareOp, Predicate, Query, SqlGrammar};
pub use context::{CompileContext, ValidationMode};
pub use criteria::{
    Criteria, CriteriaStack, ExportCriteria, ExportPeriod, FilterRulesCriteria, RequestCriteria, RequestParams,
    TableColumn, TableCriteria,
};
pub use dates::RelativeDate;
pub use error::CompileError;
pub use filters::{CustomPredicate, Filter, FilterSet, FilterType, Operand, Operator};
pub use memory::MemoryDatabase;
pub use parser::{JoinRelationParser, Parser, RuleParser};
pub use rules::{Condition, RuleGroup, RuleLeaf, RuleNode, RuleTree};
pub use schema::{EntitySchema, SchemaRegistry};
pub use value::QueryValue;
