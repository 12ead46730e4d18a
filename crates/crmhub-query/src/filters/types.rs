//! Filter types and the type → operator compatibility table.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::operator::Operator;

/// Kind of a filter, which determines its operators and value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterType {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "multi-select")]
    MultiSelect,
    #[serde(rename = "checkbox")]
    Checkbox,
    #[serde(rename = "tags")]
    Tags,
    /// Rows having at least one related row matching the chosen operand.
    #[serde(rename = "has-many")]
    HasMany,
    /// One entry targeting one of several columns; no null checks.
    #[serde(rename = "operand")]
    Operand,
    /// Like [`FilterType::Operand`], with null checks.
    #[serde(rename = "nullable-operand")]
    NullableOperand,
    #[serde(rename = "timezone")]
    Timezone,
    /// Fixed condition implemented by a custom predicate.
    #[serde(rename = "static")]
    Static,
}

impl FilterType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Select => "select",
            Self::MultiSelect => "multi-select",
            Self::Checkbox => "checkbox",
            Self::Tags => "tags",
            Self::HasMany => "has-many",
            Self::Operand => "operand",
            Self::NullableOperand => "nullable-operand",
            Self::Timezone => "timezone",
            Self::Static => "static",
        }
    }

    /// UI component rendering the filter.
    pub fn component(&self) -> String {
        format!("{}-rule", self.as_str())
    }

    /// Whether the filter selects its target through operands.
    pub fn uses_operands(&self) -> bool {
        matches!(self, Self::HasMany | Self::Operand | Self::NullableOperand)
    }

    /// Whether values are calendar dates or instants.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    /// Whether the leaf value is a list.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Self::MultiSelect | Self::Checkbox | Self::Tags)
    }

    /// Operators the type supports on its own. Operand-based types derive
    /// theirs from their operands and have none here.
    pub fn operators(&self) -> &'static [Operator] {
        OPERATORS_BY_TYPE
            .get(self)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static OPERATORS_BY_TYPE: LazyLock<HashMap<FilterType, Vec<Operator>>> = LazyLock::new(|| {
    use Operator::*;

    let temporal = vec![
        Equal,
        NotEqual,
        Less,
        LessOrEqual,
        Greater,
        GreaterOrEqual,
        Between,
        NotBetween,
        Is,
        Was,
        IsNull,
        IsNotNull,
    ];
    let choice = vec![Equal, NotEqual, IsNull, IsNotNull];
    let multiple = vec![In, NotIn, IsNull, IsNotNull];

    HashMap::from([
        (
            FilterType::Text,
            vec![
                Equal,
                NotEqual,
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
            ],
        ),
        (
            FilterType::Number,
            vec![
                Equal,
                NotEqual,
                Less,
                LessOrEqual,
                Greater,
                GreaterOrEqual,
                Between,
                NotBetween,
                IsNull,
                IsNotNull,
            ],
        ),
        (FilterType::Date, temporal.clone()),
        (FilterType::DateTime, temporal),
        (FilterType::Select, choice.clone()),
        (FilterType::Timezone, choice),
        (FilterType::MultiSelect, multiple.clone()),
        (FilterType::Checkbox, multiple.clone()),
        (FilterType::Tags, multiple),
        (FilterType::Static, vec![Equal]),
        (FilterType::HasMany, Vec::new()),
        (FilterType::Operand, Vec::new()),
        (FilterType::NullableOperand, Vec::new()),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_table_entry() {
        let types = [
            FilterType::Text,
            FilterType::Number,
            FilterType::Date,
            FilterType::DateTime,
            FilterType::Select,
            FilterType::MultiSelect,
            FilterType::Checkbox,
            FilterType::Tags,
            FilterType::HasMany,
            FilterType::Operand,
            FilterType::NullableOperand,
            FilterType::Timezone,
            FilterType::Static,
        ];
        for filter_type in types {
            assert!(OPERATORS_BY_TYPE.contains_key(&filter_type), "{filter_type}");
            assert_eq!(filter_type.operators().is_empty(), filter_type.uses_operands());
        }
    }

    #[test]
    fn test_relative_dates_only_on_temporal_types() {
        assert!(FilterType::Date.operators().contains(&Operator::Is));
        assert!(FilterType::DateTime.operators().contains(&Operator::Was));
        assert!(!FilterType::Number.operators().contains(&Operator::Is));
        assert!(!FilterType::Text.operators().contains(&Operator::Between));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_value(FilterType::NullableOperand).unwrap(),
            serde_json::json!("nullable-operand")
        );
        assert_eq!(FilterType::MultiSelect.component(), "multi-select-rule");
    }
}
