//! UI serialization of filter descriptors.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dates::RelativeDate;

use super::descriptor::{Filter, FilterOption};
use super::operator::Operator;
use super::types::FilterType;

/// The shape a filter is described to the UI in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterDescription {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub operators: Vec<Operator>,
    /// Choices of operators whose value is a token, keyed by operator.
    #[serde(rename = "operatorsOptions")]
    pub operators_options: BTreeMap<Operator, BTreeMap<String, String>>,
    pub component: String,
    #[serde(rename = "isStatic")]
    pub is_static: bool,
    pub operands: Vec<OperandDescription>,
    pub has_authorization: bool,
    #[serde(rename = "helpText")]
    pub help_text: Option<String>,
    #[serde(rename = "displayAs")]
    pub display_as: Option<String>,
    pub options: Vec<FilterOption>,
}

/// A described operand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperandDescription {
    pub value: String,
    pub label: String,
    #[serde(rename = "valueKey")]
    pub value_key: &'static str,
    #[serde(rename = "labelKey")]
    pub label_key: &'static str,
    pub rule: Box<FilterDescription>,
}

impl From<&Filter> for FilterDescription {
    fn from(filter: &Filter) -> Self {
        let operators = filter.operators();
        let operators_options = operators
            .iter()
            .filter(|op| matches!(op, Operator::Is | Operator::Was))
            .map(|op| {
                let choices = RelativeDate::for_operator(*op)
                    .iter()
                    .map(|token| (token.as_token().to_string(), token.label().to_string()))
                    .collect();
                (*op, choices)
            })
            .collect();

        Self {
            id: filter.id().to_string(),
            label: filter.label().to_string(),
            filter_type: filter.filter_type(),
            operators,
            operators_options,
            component: filter.filter_type().component(),
            is_static: filter.is_static(),
            operands: filter
                .operand_list()
                .iter()
                .map(|operand| OperandDescription {
                    value: operand.value().to_string(),
                    label: operand.label().to_string(),
                    value_key: "value",
                    label_key: "label",
                    rule: Box::new(Self::from(operand.filter())),
                })
                .collect(),
            has_authorization: filter.has_authorization(),
            help_text: filter.help().map(str::to_string),
            display_as: filter.display().map(str::to_string),
            options: filter.filter_options().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::filters::Operand;

    #[test]
    fn test_wire_keys() {
        let filter = Filter::date("due_date", "Due date").help_text("When it is due");
        let value = serde_json::to_value(FilterDescription::from(&filter)).unwrap();

        assert_eq!(value["id"], json!("due_date"));
        assert_eq!(value["type"], json!("date"));
        assert_eq!(value["component"], json!("date-rule"));
        assert_eq!(value["isStatic"], json!(false));
        assert_eq!(value["helpText"], json!("When it is due"));
        assert_eq!(value["has_authorization"], json!(false));
        assert_eq!(value["operatorsOptions"]["is"]["today"], json!("Today"));
        assert_eq!(value["operatorsOptions"]["was"]["last_30_days"], json!("Last 30 days"));
        assert!(value["operatorsOptions"].get("equal").is_none());
    }

    #[test]
    fn test_operands_nest_their_rule() {
        let filter = Filter::operand("value", "Value")
            .operands(vec![
                Operand::new("amount", "Amount", Filter::number("amount", "Amount")).unwrap(),
            ])
            .unwrap();
        let value = serde_json::to_value(FilterDescription::from(&filter)).unwrap();
        let operand = &value["operands"][0];
        assert_eq!(operand["valueKey"], json!("value"));
        assert_eq!(operand["labelKey"], json!("label"));
        assert_eq!(operand["rule"]["type"], json!("number"));
    }
}
