//! Operator handlers: one function per operator turning a leaf value into
//! a predicate on a column.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{NaiveDate, TimeDelta};
use serde_json::Value;

use crate::builder::{Column, CompareOp, Predicate};
use crate::context::CompileContext;
use crate::dates::{RelativeDate, local_midnight};
use crate::error::CompileError;
use crate::filters::{FilterType, Operator};
use crate::schema::ColumnType;
use crate::value::{QueryValue, parse_date, parse_naive_datetime};

/// Everything a handler needs to build its predicate.
pub struct Operation<'v> {
    /// Column the predicate reads.
    pub column: Column,
    /// Type values are coerced to.
    pub column_type: ColumnType,
    pub operator: Operator,
    pub value: &'v Value,
    /// Field name used in error messages.
    pub field: &'v str,
    pub context: &'v CompileContext,
}

/// Builds the predicate of one operator. `Ok(None)` means the value
/// places no constraint.
pub type Handler = fn(&Operation<'_>) -> Result<Option<Predicate>, CompileError>;

static HANDLERS: LazyLock<HashMap<Operator, Handler>> = LazyLock::new(|| {
    let mut handlers: HashMap<Operator, Handler> = HashMap::new();
    handlers.insert(Operator::Equal, equality);
    handlers.insert(Operator::NotEqual, equality);
    handlers.insert(Operator::Less, comparison);
    handlers.insert(Operator::LessOrEqual, comparison);
    handlers.insert(Operator::Greater, comparison);
    handlers.insert(Operator::GreaterOrEqual, comparison);
    handlers.insert(Operator::Between, range);
    handlers.insert(Operator::NotBetween, range);
    handlers.insert(Operator::In, membership);
    handlers.insert(Operator::NotIn, membership);
    handlers.insert(Operator::BeginsWith, pattern);
    handlers.insert(Operator::NotBeginsWith, pattern);
    handlers.insert(Operator::Contains, pattern);
    handlers.insert(Operator::NotContains, pattern);
    handlers.insert(Operator::EndsWith, pattern);
    handlers.insert(Operator::NotEndsWith, pattern);
    handlers.insert(Operator::IsEmpty, emptiness);
    handlers.insert(Operator::IsNotEmpty, emptiness);
    handlers.insert(Operator::IsNull, nullness);
    handlers.insert(Operator::IsNotNull, nullness);
    handlers.insert(Operator::Is, relative_date);
    handlers.insert(Operator::Was, relative_date);
    handlers
});

/// The handler registered for `operator`.
pub fn handler(operator: Operator) -> Option<Handler> {
    HANDLERS.get(&operator).copied()
}

/// Build the predicate for `operation`.
pub fn build_predicate(operation: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    let handler = handler(operation.operator).ok_or_else(|| CompileError::OperatorNotAllowed {
        field: operation.field.to_string(),
        operator: operation.operator.to_string(),
    })?;
    handler(operation)
}

/// Column type assumed for a filter whose column is not in the schema.
pub fn column_type_for(filter_type: FilterType) -> ColumnType {
    match filter_type {
        FilterType::Number => ColumnType::Decimal,
        FilterType::Date => ColumnType::Date,
        FilterType::DateTime => ColumnType::DateTime,
        _ => ColumnType::Text,
    }
}

/// Comparison with a count or a column value.
pub fn compare_op(operator: Operator) -> Option<CompareOp> {
    match operator {
        Operator::Equal => Some(CompareOp::Eq),
        Operator::NotEqual => Some(CompareOp::Ne),
        Operator::Less => Some(CompareOp::Lt),
        Operator::LessOrEqual => Some(CompareOp::Lte),
        Operator::Greater => Some(CompareOp::Gt),
        Operator::GreaterOrEqual => Some(CompareOp::Gte),
        _ => None,
    }
}

/// Split a list value: an array, or a comma separated string. Entries are
/// trimmed and empty ones dropped.
pub fn list_values(value: &Value) -> Vec<Value> {
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::String(text) => text.split(',').map(|item| Value::from(item.trim())).collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    };
    items
        .into_iter()
        .filter(|item| match item {
            Value::Null => false,
            Value::String(text) => !text.trim().is_empty(),
            _ => true,
        })
        .map(|item| match item {
            Value::String(text) => Value::from(text.trim()),
            other => other,
        })
        .collect()
}

impl Operation<'_> {
    fn invalid(&self, reason: impl Into<String>) -> CompileError {
        CompileError::invalid_value(self.field, self.operator.as_str(), reason)
    }

    /// Coerce a JSON value to the column type. Naive datetimes are local
    /// times in the context timezone.
    fn scalar(&self, value: &Value) -> Result<QueryValue, CompileError> {
        if self.column_type == ColumnType::DateTime {
            if let Some(naive) = value.as_str().and_then(parse_naive_datetime) {
                let offset = TimeDelta::seconds(i64::from(self.context.timezone.local_minus_utc()));
                return Ok(QueryValue::DateTime((naive - offset).and_utc()));
            }
        }
        let coerced = QueryValue::from_json(value, self.column_type)
            .ok_or_else(|| self.invalid(format!("{value} is not a valid {:?}", self.column_type)))?;
        if coerced.is_null() {
            return Err(self.invalid("a value is required"));
        }
        Ok(coerced)
    }

    /// A plain date given for a datetime column.
    fn date_only(&self, value: &Value) -> Option<NaiveDate> {
        if self.column_type != ColumnType::DateTime {
            return None;
        }
        value
            .as_str()
            .map(str::trim)
            .filter(|text| text.len() == 10)
            .and_then(parse_date)
    }

    /// `[start, end)` instants of a local day.
    fn local_day(&self, date: NaiveDate) -> Result<(QueryValue, QueryValue), CompileError> {
        let next = date
            .succ_opt()
            .ok_or_else(|| self.invalid("date out of range"))?;
        Ok((
            QueryValue::DateTime(local_midnight(date, self.context.timezone)),
            QueryValue::DateTime(local_midnight(next, self.context.timezone)),
        ))
    }

    fn text(&self) -> Result<String, CompileError> {
        match self.value {
            Value::String(text) => Ok(text.clone()),
            Value::Number(number) => Ok(number.to_string()),
            Value::Bool(flag) => Ok(flag.to_string()),
            _ => Err(self.invalid("a text value is required")),
        }
    }
}

fn equality(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    let negated = op.operator == Operator::NotEqual;
    if op.value.is_null() {
        return Ok(Some(Predicate::Null {
            column: op.column.clone(),
            negated,
        }));
    }
    if let Some(date) = op.date_only(op.value) {
        let (start, end) = op.local_day(date)?;
        return Ok(Some(if negated {
            Predicate::outside(op.column.clone(), start, end)
        } else {
            Predicate::half_open(op.column.clone(), start, end)
        }));
    }
    let value = op.scalar(op.value)?;
    let compare = if negated { CompareOp::Ne } else { CompareOp::Eq };
    Ok(Some(Predicate::compare(op.column.clone(), compare, value)))
}

fn comparison(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    let compare = compare_op(op.operator).ok_or_else(|| op.invalid("not a comparison"))?;
    if let Some(date) = op.date_only(op.value) {
        let (start, end) = op.local_day(date)?;
        let (compare, bound) = match compare {
            CompareOp::Lt => (CompareOp::Lt, start),
            CompareOp::Lte => (CompareOp::Lt, end),
            CompareOp::Gt => (CompareOp::Gte, end),
            _ => (CompareOp::Gte, start),
        };
        return Ok(Some(Predicate::compare(op.column.clone(), compare, bound)));
    }
    let value = op.scalar(op.value)?;
    Ok(Some(Predicate::compare(op.column.clone(), compare, value)))
}

fn range(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    let negated = op.operator == Operator::NotBetween;
    let bounds = match op.value {
        Value::Array(items) if items.len() == 2 => items,
        _ => return Err(op.invalid("a two element range is required")),
    };

    if let (Some(first), Some(last)) = (op.date_only(&bounds[0]), op.date_only(&bounds[1])) {
        let (start, _) = op.local_day(first)?;
        let (_, end) = op.local_day(last)?;
        return Ok(Some(if negated {
            Predicate::outside(op.column.clone(), start, end)
        } else {
            Predicate::half_open(op.column.clone(), start, end)
        }));
    }

    Ok(Some(Predicate::Between {
        column: op.column.clone(),
        low: op.scalar(&bounds[0])?,
        high: op.scalar(&bounds[1])?,
        negated,
    }))
}

fn membership(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    let values = list_values(op.value)
        .iter()
        .map(|item| op.scalar(item))
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(Predicate::In {
        column: op.column.clone(),
        values,
        negated: op.operator == Operator::NotIn,
    }))
}

fn pattern(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    let text = op.text()?;
    let (pattern, negated) = match op.operator {
        Operator::BeginsWith => (format!("{text}%"), false),
        Operator::NotBeginsWith => (format!("{text}%"), true),
        Operator::Contains => (format!("%{text}%"), false),
        Operator::NotContains => (format!("%{text}%"), true),
        Operator::EndsWith => (format!("%{text}"), false),
        Operator::NotEndsWith => (format!("%{text}"), true),
        _ => return Err(op.invalid("not a pattern operator")),
    };
    Ok(Some(Predicate::Like {
        column: op.column.clone(),
        pattern,
        negated,
    }))
}

fn emptiness(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    Ok(Some(Predicate::Empty {
        column: op.column.clone(),
        negated: op.operator == Operator::IsNotEmpty,
    }))
}

fn nullness(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    Ok(Some(Predicate::Null {
        column: op.column.clone(),
        negated: op.operator == Operator::IsNotNull,
    }))
}

fn relative_date(op: &Operation<'_>) -> Result<Option<Predicate>, CompileError> {
    let token = op
        .value
        .as_str()
        .and_then(RelativeDate::parse)
        .filter(|token| token.operator() == op.operator)
        .ok_or_else(|| op.invalid(format!("{} is not a relative date for '{}'", op.value, op.operator)))?;
    let (start, end) = token
        .resolve(op.context.local_today())
        .ok_or_else(|| op.invalid("date out of range"))?;

    let (low, high) = match op.column_type {
        ColumnType::DateTime => (
            QueryValue::DateTime(local_midnight(start, op.context.timezone)),
            QueryValue::DateTime(local_midnight(end, op.context.timezone)),
        ),
        _ => (QueryValue::Date(start), QueryValue::Date(end)),
    };
    Ok(Some(Predicate::half_open(op.column.clone(), low, high)))
}
