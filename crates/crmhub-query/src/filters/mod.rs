//! Filter descriptors and the operator vocabulary.
//!
//! A [`Filter`] says which operators a field accepts and how its value is
//! interpreted; the [`Parser`](crate::parser::Parser) turns leaves on it
//! into predicates. Descriptors are validated when a [`FilterSet`] is
//! built, so misconfiguration surfaces at startup rather than per request.

pub mod describe;
pub mod descriptor;
pub mod operator;
pub mod set;
pub mod types;

pub use describe::{FilterDescription, OperandDescription};
pub use descriptor::{CURRENT_USER, CustomPredicate, CustomPredicateFn, Filter, FilterOption, Operand};
pub use operator::Operator;
pub use set::FilterSet;
pub use types::FilterType;
