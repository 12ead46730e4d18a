//! Rule operators and their wire tokens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// An operator a rule leaf can apply to a field.
///
/// Variants are declared in canonical order; operator lists derived from
/// several sources are sorted by it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Between,
    NotBetween,
    In,
    NotIn,
    BeginsWith,
    NotBeginsWith,
    Contains,
    NotContains,
    EndsWith,
    NotEndsWith,
    IsEmpty,
    IsNotEmpty,
    IsNull,
    IsNotNull,
    /// Relative date window in the present or future (`today`, `next_week`).
    Is,
    /// Relative date window in the past (`yesterday`, `last_30_days`).
    Was,
}

impl Operator {
    /// Every operator, in canonical order.
    pub const ALL: [Self; 22] = [
        Self::Equal,
        Self::NotEqual,
        Self::Less,
        Self::LessOrEqual,
        Self::Greater,
        Self::GreaterOrEqual,
        Self::Between,
        Self::NotBetween,
        Self::In,
        Self::NotIn,
        Self::BeginsWith,
        Self::NotBeginsWith,
        Self::Contains,
        Self::NotContains,
        Self::EndsWith,
        Self::NotEndsWith,
        Self::IsEmpty,
        Self::IsNotEmpty,
        Self::IsNull,
        Self::IsNotNull,
        Self::Is,
        Self::Was,
    ];

    /// Canonical token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Less => "less",
            Self::LessOrEqual => "less_or_equal",
            Self::Greater => "greater",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::Between => "between",
            Self::NotBetween => "not_between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::BeginsWith => "begins_with",
            Self::NotBeginsWith => "not_begins_with",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::EndsWith => "ends_with",
            Self::NotEndsWith => "not_ends_with",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::Is => "is",
            Self::Was => "was",
        }
    }

    /// Parse a canonical token or one of its symbolic aliases.
    pub fn parse_token(token: &str) -> Option<Self> {
        let token = token.trim();
        let alias = match token {
            "=" | "==" => Some(Self::Equal),
            "!=" | "<>" => Some(Self::NotEqual),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessOrEqual),
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterOrEqual),
            _ => None,
        };
        if alias.is_some() {
            return alias;
        }

        let token = token.to_ascii_lowercase();
        match token.as_str() {
            "like" => Some(Self::Contains),
            "not_like" | "not like" => Some(Self::NotContains),
            other => Self::ALL.into_iter().find(|op| op.as_str() == other),
        }
    }

    /// `is_null` / `is_not_null`.
    pub fn is_null_check(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// `is_empty` / `is_not_empty`.
    pub fn is_empty_check(&self) -> bool {
        matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }

    /// `between` / `not_between`.
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Between | Self::NotBetween)
    }

    /// Whether the operator reads the leaf value at all.
    pub fn takes_value(&self) -> bool {
        !self.is_null_check() && !self.is_empty_check()
    }

    /// Whether the operator matches rows where the condition is absent.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Self::NotEqual
                | Self::NotBetween
                | Self::NotIn
                | Self::NotBeginsWith
                | Self::NotContains
                | Self::NotEndsWith
                | Self::IsNotEmpty
                | Self::IsNotNull
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_token(s).ok_or_else(|| CompileError::OperatorNotAllowed {
            field: String::new(),
            operator: s.to_string(),
        })
    }
}
