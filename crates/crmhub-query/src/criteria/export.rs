use std::sync::Arc;

use chrono::NaiveDate;
use crmhub_core::result::AppResult;
use crmhub_core::types::SortDirection;
use serde_json::Value;

use crate::builder::{Boolean, Predicate, Query};
use crate::context::CompileContext;
use crate::dates::{RelativeDate, local_midnight};
use crate::error::CompileError;
use crate::schema::ColumnType;
use crate::value::{QueryValue, parse_date};

use super::Criteria;

/// Rows an export covers, by date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPeriod {
    /// A relative window such as `last_30_days`.
    Relative(RelativeDate),
    /// Inclusive calendar dates.
    Range { start: NaiveDate, end: NaiveDate },
}

impl ExportPeriod {
    /// Parse a period token or a `[start, end]` pair. `null` and `""` mean
    /// no period.
    pub fn from_value(value: &Value) -> Result<Option<Self>, CompileError> {
        let invalid = |reason: &str| CompileError::invalid_value("period", "between", reason);
        match value {
            Value::Null => Ok(None),
            Value::String(token) if token.trim().is_empty() => Ok(None),
            Value::String(token) => RelativeDate::parse(token.trim())
                .map(|period| Some(Self::Relative(period)))
                .ok_or_else(|| invalid("unknown relative period")),
            Value::Array(bounds) if bounds.len() == 2 => {
                let date = |value: &Value| value.as_str().and_then(parse_date);
                let (Some(start), Some(end)) = (date(&bounds[0]), date(&bounds[1])) else {
                    return Err(invalid("period bounds must be dates"));
                };
                if start > end {
                    return Err(invalid("period starts after it ends"));
                }
                Ok(Some(Self::Range { start, end }))
            }
            _ => Err(invalid("expected a relative period or [start, end]")),
        }
    }

    /// Local days `[start, end)` covered, relative to `today`.
    pub fn days(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            Self::Relative(period) => period.resolve(today),
            Self::Range { start, end } => Some((*start, end.succ_opt()?)),
        }
    }
}

/// Restricts an export to a period of a date column and orders it newest
/// first.
pub struct ExportCriteria<'a> {
    column: String,
    period: Option<ExportPeriod>,
    context: &'a CompileContext,
}

impl<'a> ExportCriteria<'a> {
    pub fn new(column: impl Into<String>, period: Option<ExportPeriod>, context: &'a CompileContext) -> Self {
        Self {
            column: column.into(),
            period,
            context,
        }
    }
}

impl Criteria for ExportCriteria<'_> {
    fn apply(&self, query: &mut Query) -> AppResult<()> {
        let entity = Arc::clone(query.entity());
        let column_type = entity.column_type(&self.column).ok_or_else(|| CompileError::UnknownColumn {
            entity: entity.name.clone(),
            column: self.column.clone(),
        })?;

        if let Some(period) = self.period {
            let (start, end) = period
                .days(self.context.local_today())
                .ok_or_else(|| CompileError::invalid_value(&self.column, "between", "period out of range"))?;
            let (low, high) = match column_type {
                ColumnType::DateTime => (
                    QueryValue::DateTime(local_midnight(start, self.context.timezone)),
                    QueryValue::DateTime(local_midnight(end, self.context.timezone)),
                ),
                ColumnType::Date => (QueryValue::Date(start), QueryValue::Date(end)),
                other => {
                    return Err(CompileError::invalid_value(
                        &self.column,
                        "between",
                        format!("{other:?} column cannot bound a period"),
                    )
                    .into());
                }
            };
            let column = query.column(&self.column);
            query.where_clause(Boolean::And, Predicate::half_open(column, low, high));
        }

        query.forget_orders();
        query.order_by_column(&self.column, SortDirection::Desc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::schema::{EntitySchema, SchemaRegistry};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([EntitySchema::new("activities", "activities")
            .column("created_at", ColumnType::DateTime)
            .column("due_date", ColumnType::Date)])
        .unwrap()
    }

    fn database(registry: &SchemaRegistry) -> MemoryDatabase {
        MemoryDatabase::from_json(
            registry,
            &json!({"activities": [
                {"id": 1, "created_at": "2024-03-09T23:30:00Z", "due_date": "2024-03-01"},
                {"id": 2, "created_at": "2024-03-10T08:00:00Z", "due_date": "2024-03-10"},
                {"id": 3, "created_at": "2024-02-01T08:00:00Z", "due_date": "2024-02-20"}
            ]}),
        )
        .unwrap()
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!(ExportPeriod::from_value(&json!(null)).unwrap(), None);
        assert_eq!(
            ExportPeriod::from_value(&json!("last_7_days")).unwrap(),
            Some(ExportPeriod::Relative(RelativeDate::LastDays(7)))
        );
        assert!(ExportPeriod::from_value(&json!(["2024-03-10", "2024-03-01"])).is_err());
        assert!(ExportPeriod::from_value(&json!("someday")).is_err());
    }

    #[test]
    fn test_relative_period_uses_local_days() {
        let registry = registry();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let context = CompileContext::new(now, FixedOffset::east_opt(3600).unwrap());
        let mut query = Query::new(registry.get("activities").unwrap());
        ExportCriteria::new("created_at", Some(ExportPeriod::Relative(RelativeDate::Today)), &context)
            .apply(&mut query)
            .unwrap();
        // 23:30 UTC on the 9th is already the 10th at +01:00
        assert_eq!(database(&registry).ids(&query), vec![2, 1]);
    }

    #[test]
    fn test_inclusive_range_on_date_column() {
        let registry = registry();
        let context = CompileContext::utc(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
        let period = ExportPeriod::from_value(&json!(["2024-02-20", "2024-03-01"])).unwrap();
        let mut query = Query::new(registry.get("activities").unwrap());
        ExportCriteria::new("due_date", period, &context)
            .apply(&mut query)
            .unwrap();
        assert_eq!(database(&registry).ids(&query), vec![1, 3]);
    }

    #[test]
    fn test_without_period_orders_newest_first() {
        let registry = registry();
        let context = CompileContext::utc(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
        let mut query = Query::new(registry.get("activities").unwrap());
        ExportCriteria::new("created_at", None, &context)
            .apply(&mut query)
            .unwrap();
        assert_eq!(database(&registry).ids(&query), vec![2, 1, 3]);
        assert!(ExportCriteria::new("missing", None, &context).apply(&mut query).is_err());
    }
}
