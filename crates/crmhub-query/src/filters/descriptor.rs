//! Filter descriptors: the static metadata of one filterable field.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::builder::{Boolean, Query};
use crate::error::CompileError;
use crate::parser::Parser;
use crate::rules::RuleLeaf;

use super::operator::Operator;
use super::types::FilterType;

/// Sentinel value a user selector replaces with the current user's id.
pub const CURRENT_USER: &str = "me";

/// Signature of a custom predicate.
///
/// Receives the builder to write into, the leaf value, how the predicate
/// combines with its siblings, the operator, the leaf itself and the parser
/// compiling it.
pub type CustomPredicateFn = dyn Fn(&mut Query, &Value, Boolean, Operator, &RuleLeaf, &Parser<'_>) -> Result<(), CompileError>
    + Send
    + Sync;

/// A named predicate that owns all semantics of a filter.
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    callback: Arc<CustomPredicateFn>,
}

impl CustomPredicate {
    /// Wrap a callback under a name used in logs and debug output.
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut Query, &Value, Boolean, Operator, &RuleLeaf, &Parser<'_>) -> Result<(), CompileError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// Name of the predicate.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the predicate.
    pub fn apply(
        &self,
        query: &mut Query,
        value: &Value,
        boolean: Boolean,
        operator: Operator,
        leaf: &RuleLeaf,
        parser: &Parser<'_>,
    ) -> Result<(), CompileError> {
        (self.callback)(query, value, boolean, operator, leaf, parser)
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A selectable option of a select-like filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    /// Stored value.
    pub value: Value,
    /// Display label.
    pub label: String,
}

impl FilterOption {
    /// Create an option.
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// One sub-field an operand filter can target.
#[derive(Debug, Clone)]
pub struct Operand {
    value: String,
    label: String,
    filter: Box<Filter>,
}

impl Operand {
    /// Create an operand targeting `value` with the semantics of `filter`.
    ///
    /// A has-many filter cannot be used as an operand.
    pub fn new(
        value: impl Into<String>,
        label: impl Into<String>,
        filter: Filter,
    ) -> Result<Self, CompileError> {
        let value = value.into();
        if filter.filter_type == FilterType::HasMany {
            return Err(CompileError::descriptor(
                value,
                "a has-many filter cannot be used as an operand",
            ));
        }
        Ok(Self {
            value,
            label: label.into(),
            filter: Box::new(filter),
        })
    }

    /// Field the operand compiles against.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Filter providing the operand's operators and value semantics.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

/// Metadata of one filterable field.
///
/// Built with a per-type constructor and chained options; fallible options
/// return the construction error immediately.
#[derive(Debug, Clone)]
pub struct Filter {
    id: String,
    label: String,
    filter_type: FilterType,
    column: Option<String>,
    options: Vec<FilterOption>,
    excluded: Vec<Operator>,
    only: Option<Vec<Operator>>,
    operands: Vec<Operand>,
    relation: Option<String>,
    countable: Option<String>,
    custom: Option<CustomPredicate>,
    date_time_parts: Option<(String, String)>,
    authorization: Option<bool>,
    help_text: Option<String>,
    display_as: Option<String>,
    user_selector: bool,
}

impl Filter {
    fn new(id: impl Into<String>, label: impl Into<String>, filter_type: FilterType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            filter_type,
            column: None,
            options: Vec::new(),
            excluded: Vec::new(),
            only: None,
            operands: Vec::new(),
            relation: None,
            countable: None,
            custom: None,
            date_time_parts: None,
            authorization: None,
            help_text: None,
            display_as: None,
            user_selector: false,
        }
    }

    // --- Constructors ---

    pub fn text(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FilterType::Text)
    }

    pub fn number(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FilterType::Number)
    }

    pub fn date(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FilterType::Date)
    }

    pub fn date_time(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FilterType::DateTime)
    }

    pub fn select(
        id: impl Into<String>,
        label: impl Into<String>,
        options: Vec<FilterOption>,
    ) -> Self {
        Self::new(id, label, FilterType::Select).options(options)
    }

    pub fn multi_select(
        id: impl Into<String>,
        label: impl Into<String>,
        options: Vec<FilterOption>,
    ) -> Self {
        Self::new(id, label, FilterType::MultiSelect).options(options)
    }

    pub fn checkbox(
        id: impl Into<String>,
        label: impl Into<String>,
        options: Vec<FilterOption>,
    ) -> Self {
        Self::new(id, label, FilterType::Checkbox).options(options)
    }

    /// Tags attached through `relation`; values are tag keys.
    pub fn tags(
        id: impl Into<String>,
        label: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        let mut filter = Self::new(id, label, FilterType::Tags);
        filter.relation = Some(relation.into());
        filter
    }

    /// Rows having at least one `relation` row matching the chosen operand.
    pub fn has_many(
        id: impl Into<String>,
        label: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        let mut filter = Self::new(id, label, FilterType::HasMany);
        filter.relation = Some(relation.into());
        filter
    }

    pub fn operand(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FilterType::Operand)
    }

    pub fn nullable_operand(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FilterType::NullableOperand)
    }

    pub fn timezone(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, FilterType::Timezone)
    }

    /// Fixed condition; the leaf value only toggles it.
    pub fn static_filter(
        id: impl Into<String>,
        label: impl Into<String>,
        custom: CustomPredicate,
    ) -> Self {
        Self::new(id, label, FilterType::Static).custom(custom)
    }

    /// A select over users whose first option is the current user.
    pub fn user(
        id: impl Into<String>,
        label: impl Into<String>,
        options: Vec<FilterOption>,
    ) -> Self {
        let mut all = vec![FilterOption::new(CURRENT_USER, "Me")];
        all.extend(options);
        Self::select(id, label, all).user_selector()
    }

    // --- Options ---

    /// Storage column when it differs from the id.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn options(mut self, options: Vec<FilterOption>) -> Self {
        self.options = options;
        self
    }

    /// Remove operators from the derived set.
    pub fn exclude_operators(mut self, operators: impl IntoIterator<Item = Operator>) -> Self {
        self.excluded.extend(operators);
        self
    }

    /// Restrict the derived set to these operators.
    pub fn only_operators(mut self, operators: impl IntoIterator<Item = Operator>) -> Self {
        self.only = Some(operators.into_iter().collect());
        self
    }

    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = Some(text.into());
        self
    }

    pub fn display_as(mut self, display: impl Into<String>) -> Self {
        self.display_as = Some(display.into());
        self
    }

    /// Whether the current user may use the filter. Unauthorized filters
    /// are hidden and their leaves ignored.
    pub fn authorized(mut self, authorized: bool) -> Self {
        self.authorization = Some(authorized);
        self
    }

    /// Delegate compilation of every leaf to `custom`.
    pub fn custom(mut self, custom: CustomPredicate) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Compare against a timestamp assembled from a date and a time column.
    pub fn date_time_parts(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.date_time_parts = Some((date.into(), time.into()));
        self
    }

    /// Substitute the `"me"` sentinel with the current user's id.
    pub fn user_selector(mut self) -> Self {
        self.user_selector = true;
        self
    }

    /// Attach the selectable sub-fields.
    pub fn operands(mut self, operands: Vec<Operand>) -> Result<Self, CompileError> {
        if self.countable.is_some() {
            return Err(CompileError::descriptor(
                &self.id,
                "a countable relation filter cannot have operands",
            ));
        }
        self.operands = operands;
        Ok(self)
    }

    /// Compare values against the number of `relation` rows.
    pub fn countable_relation(mut self, relation: impl Into<String>) -> Result<Self, CompileError> {
        if !self.operands.is_empty() {
            return Err(CompileError::descriptor(
                &self.id,
                "a filter with operands cannot be a countable relation",
            ));
        }
        self.countable = Some(relation.into());
        self.check_countable_operators()?;
        Ok(self)
    }

    // --- Accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Column or relation path the filter compiles against.
    pub fn field(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.id)
    }

    pub fn filter_options(&self) -> &[FilterOption] {
        &self.options
    }

    pub fn operand_list(&self) -> &[Operand] {
        &self.operands
    }

    /// Find an operand by value.
    pub fn find_operand(&self, value: &str) -> Option<&Operand> {
        self.operands.iter().find(|operand| operand.value == value)
    }

    /// Relation of a has-many or tags filter.
    pub fn relation(&self) -> Option<&str> {
        self.relation.as_deref()
    }

    /// Relation counted by a countable filter.
    pub fn countable(&self) -> Option<&str> {
        self.countable.as_deref()
    }

    pub fn custom_predicate(&self) -> Option<&CustomPredicate> {
        self.custom.as_ref()
    }

    pub fn date_time_columns(&self) -> Option<(&str, &str)> {
        self.date_time_parts
            .as_ref()
            .map(|(date, time)| (date.as_str(), time.as_str()))
    }

    pub fn is_authorized(&self) -> bool {
        self.authorization.unwrap_or(true)
    }

    pub fn has_authorization(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn is_static(&self) -> bool {
        self.filter_type == FilterType::Static
    }

    pub fn is_user_selector(&self) -> bool {
        self.user_selector
    }

    pub fn help(&self) -> Option<&str> {
        self.help_text.as_deref()
    }

    pub fn display(&self) -> Option<&str> {
        self.display_as.as_deref()
    }

    /// Allowed operators in canonical order.
    pub fn operators(&self) -> Vec<Operator> {
        let mut operators: BTreeSet<Operator> = match self.filter_type {
            FilterType::HasMany | FilterType::NullableOperand => self.operand_operators().collect(),
            FilterType::Operand => self
                .operand_operators()
                .filter(|op| !op.is_null_check())
                .collect(),
            other => other.operators().iter().copied().collect(),
        };

        if self.countable.is_some() {
            operators.retain(|op| !op.is_range() && !op.is_null_check() && !op.is_empty_check());
        }
        if let Some(only) = &self.only {
            operators.retain(|op| only.contains(op));
        }
        operators.retain(|op| !self.excluded.contains(op));
        operators.into_iter().collect()
    }

    /// Whether `operator` is allowed on this filter.
    pub fn allows(&self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }

    /// Whether `operator` is allowed for the operand `value` of this filter.
    pub fn allows_with_operand(&self, operand: &Operand, operator: Operator) -> bool {
        self.allows(operator) && operand.filter.allows(operator)
    }

    fn operand_operators(&self) -> impl Iterator<Item = Operator> + '_ {
        self.operands
            .iter()
            .flat_map(|operand| operand.filter.operators())
    }

    /// Check the descriptor for construction-time misuse.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.filter_type.uses_operands() && self.operands.is_empty() {
            return Err(CompileError::descriptor(
                &self.id,
                format!("a {} filter requires operands", self.filter_type),
            ));
        }
        if self.filter_type == FilterType::HasMany && self.relation.is_none() {
            return Err(CompileError::descriptor(&self.id, "a has-many filter requires a relation"));
        }
        if self.filter_type == FilterType::Tags && self.relation.is_none() {
            return Err(CompileError::descriptor(&self.id, "a tags filter requires a relation"));
        }
        if self.filter_type == FilterType::Static && self.custom.is_none() {
            return Err(CompileError::descriptor(
                &self.id,
                "a static filter requires a custom predicate",
            ));
        }
        if self.countable.is_some() && !self.operands.is_empty() {
            return Err(CompileError::descriptor(
                &self.id,
                "a countable relation filter cannot have operands",
            ));
        }
        for operand in &self.operands {
            if operand.filter.filter_type == FilterType::HasMany {
                return Err(CompileError::descriptor(
                    &operand.value,
                    "a has-many filter cannot be used as an operand",
                ));
            }
            operand.filter.validate()?;
        }
        self.check_countable_operators()
    }

    fn check_countable_operators(&self) -> Result<(), CompileError> {
        if self.countable.is_none() {
            return Ok(());
        }
        let explicit_range = self
            .only
            .as_ref()
            .is_some_and(|only| only.iter().any(Operator::is_range));
        if explicit_range {
            return Err(CompileError::descriptor(
                &self.id,
                "between and not_between are not supported on a countable relation",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_operands() -> Vec<Operand> {
        vec![
            Operand::new("amount", "Amount", Filter::number("amount", "Amount")).unwrap(),
            Operand::new("name", "Name", Filter::text("name", "Name")).unwrap(),
        ]
    }

    #[test]
    fn test_operators_follow_type_table() {
        let filter = Filter::number("amount", "Amount");
        assert_eq!(filter.operators(), FilterType::Number.operators().to_vec());
        assert!(filter.allows(Operator::Between));
        assert!(!filter.allows(Operator::Contains));
    }

    #[test]
    fn test_excluded_and_only_operators() {
        let filter = Filter::text("name", "Name")
            .exclude_operators([Operator::IsEmpty, Operator::IsNotEmpty]);
        assert!(!filter.allows(Operator::IsEmpty));
        assert!(filter.allows(Operator::Contains));

        let filter = Filter::text("name", "Name").only_operators([Operator::Equal, Operator::Less]);
        assert_eq!(filter.operators(), vec![Operator::Equal]);
    }

    #[test]
    fn test_countable_drops_ranges_and_null_checks() {
        let filter = Filter::number("activities_count", "Activities")
            .countable_relation("activities")
            .unwrap();
        let operators = filter.operators();
        assert!(operators.contains(&Operator::GreaterOrEqual));
        assert!(!operators.contains(&Operator::Between));
        assert!(!operators.contains(&Operator::IsNull));
    }

    #[test]
    fn test_countable_rejects_explicit_between() {
        let err = Filter::number("activities_count", "Activities")
            .only_operators([Operator::Between])
            .countable_relation("activities")
            .unwrap_err();
        assert!(matches!(err, CompileError::Descriptor { .. }));
    }

    #[test]
    fn test_has_many_cannot_be_operand() {
        let has_many = Filter::has_many("products", "Products", "products")
            .operands(stage_operands())
            .unwrap();
        let err = Operand::new("products", "Products", has_many).unwrap_err();
        assert!(matches!(err, CompileError::Descriptor { .. }));
    }

    #[test]
    fn test_countable_and_operands_are_exclusive() {
        let err = Filter::number("n", "N")
            .countable_relation("activities")
            .unwrap()
            .operands(stage_operands())
            .unwrap_err();
        assert!(matches!(err, CompileError::Descriptor { .. }));
    }

    #[test]
    fn test_operand_operators_union_without_null_checks() {
        let filter = Filter::operand("value", "Value")
            .operands(stage_operands())
            .unwrap();
        let operators = filter.operators();
        assert!(operators.contains(&Operator::Between));
        assert!(operators.contains(&Operator::Contains));
        assert!(!operators.contains(&Operator::IsNull));

        let nullable = Filter::nullable_operand("value", "Value")
            .operands(stage_operands())
            .unwrap();
        assert!(nullable.allows(Operator::IsNull));
    }

    #[test]
    fn test_validate_requires_operands() {
        assert!(Filter::operand("value", "Value").validate().is_err());
        assert!(Filter::text("name", "Name").validate().is_ok());
    }

    #[test]
    fn test_user_filter_prepends_current_user() {
        let filter = Filter::user("user_id", "Owner", vec![FilterOption::new(5, "Jane")]);
        assert!(filter.is_user_selector());
        assert_eq!(filter.filter_options()[0].value, Value::from(CURRENT_USER));
        assert_eq!(filter.filter_options().len(), 2);
    }
}
