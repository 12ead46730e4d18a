//! Predicate tree stored in a [`Query`](super::Query).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::schema::RelationLink;
use crate::value::QueryValue;

use super::Query;

/// How a clause combines with the clauses before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boolean {
    /// Conjunction.
    #[default]
    And,
    /// Disjunction.
    Or,
}

impl Boolean {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl CompareOp {
    /// SQL operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    /// Whether an ordering between the two operands satisfies the operator.
    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
        }
    }
}

/// Something a predicate reads from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// A qualified column.
    Field {
        /// Table name or alias.
        qualifier: String,
        /// Column name.
        name: String,
    },
    /// A timestamp assembled from a date column and a time column.
    DateTimeParts {
        /// Table name or alias.
        qualifier: String,
        /// Date column.
        date: String,
        /// Time column; a `NULL` time counts as midnight.
        time: String,
    },
}

impl Column {
    /// A qualified column.
    pub fn field(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Field {
            qualifier: qualifier.into(),
            name: name.into(),
        }
    }

    /// The qualifier the column belongs to.
    pub fn qualifier(&self) -> &str {
        match self {
            Self::Field { qualifier, .. } | Self::DateTimeParts { qualifier, .. } => qualifier,
        }
    }

    /// Column name used as the output key when selected.
    pub fn output_name(&self) -> &str {
        match self {
            Self::Field { name, .. } => name,
            Self::DateTimeParts { date, .. } => date,
        }
    }
}

/// A single where clause.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// Combination with the preceding clause; ignored on the first one.
    pub boolean: Boolean,
    /// The condition.
    pub predicate: Predicate,
}

/// A condition on the rows of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op value`.
    Compare {
        /// Left operand.
        column: Column,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        value: QueryValue,
    },
    /// Case-insensitive pattern match with `%` and `_` wildcards.
    Like {
        /// Column matched.
        column: Column,
        /// Pattern.
        pattern: String,
        /// `NOT LIKE`.
        negated: bool,
    },
    /// Membership test.
    In {
        /// Column tested.
        column: Column,
        /// Candidate values.
        values: Vec<QueryValue>,
        /// `NOT IN`.
        negated: bool,
    },
    /// `IS [NOT] NULL`.
    Null {
        /// Column tested.
        column: Column,
        /// `IS NOT NULL`.
        negated: bool,
    },
    /// `NULL` or the empty string.
    Empty {
        /// Column tested.
        column: Column,
        /// Neither `NULL` nor empty.
        negated: bool,
    },
    /// Inclusive range.
    Between {
        /// Column tested.
        column: Column,
        /// Lower bound.
        low: QueryValue,
        /// Upper bound.
        high: QueryValue,
        /// `NOT BETWEEN`.
        negated: bool,
    },
    /// Parenthesised group of clauses.
    Nested(Vec<WhereClause>),
    /// Correlated `[NOT] EXISTS` over a relation.
    Exists {
        /// How the sub-query correlates with the parent.
        link: RelationLink,
        /// Constraints on the related rows.
        query: Box<Query>,
        /// `NOT EXISTS`.
        negated: bool,
    },
    /// Correlated count of related rows compared to a number.
    Count {
        /// How the sub-query correlates with the parent.
        link: RelationLink,
        /// Constraints on the related rows.
        query: Box<Query>,
        /// Comparison against the count.
        op: CompareOp,
        /// Count compared against.
        value: i64,
    },
    /// Constant truth value.
    Const(bool),
}

impl Predicate {
    /// `column = value`.
    pub fn eq(column: Column, value: impl Into<QueryValue>) -> Self {
        Self::Compare {
            column,
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    /// `column op value`.
    pub fn compare(column: Column, op: CompareOp, value: impl Into<QueryValue>) -> Self {
        Self::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    /// Half-open interval `low <= column < high`, as a nested group.
    pub fn half_open(column: Column, low: QueryValue, high: QueryValue) -> Self {
        Self::Nested(vec![
            WhereClause {
                boolean: Boolean::And,
                predicate: Self::compare(column.clone(), CompareOp::Gte, low),
            },
            WhereClause {
                boolean: Boolean::And,
                predicate: Self::compare(column, CompareOp::Lt, high),
            },
        ])
    }

    /// Complement of [`Predicate::half_open`]: `column < low OR column >= high`.
    pub fn outside(column: Column, low: QueryValue, high: QueryValue) -> Self {
        Self::Nested(vec![
            WhereClause {
                boolean: Boolean::And,
                predicate: Self::compare(column.clone(), CompareOp::Lt, low),
            },
            WhereClause {
                boolean: Boolean::Or,
                predicate: Self::compare(column, CompareOp::Gte, high),
            },
        ])
    }
}
