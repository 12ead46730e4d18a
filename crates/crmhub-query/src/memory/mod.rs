//! In-memory execution of [`Query`] values.
//!
//! `MemoryDatabase` evaluates the same predicate tree the SQL grammar
//! renders, with SQL semantics: `NULL` comparisons are unknown (and so
//! false), `AND` binds tighter than `OR`, global scopes apply unless
//! removed, and left joins keep unmatched rows. It backs the CLI `search`
//! command and the tests that check compiled filters against a reference
//! evaluator.

mod eval;

use std::collections::{BTreeMap, HashMap};

use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;
use crmhub_core::types::SortDirection;

use crate::builder::{AggregateFunction, JoinKind, OrderTarget, Query};
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::value::QueryValue;

use eval::{Scope, aggregate, column_value, constraints_hold, predicate_holds};

/// A stored row: column name to value.
pub type Row = BTreeMap<String, QueryValue>;

/// Tables of rows keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON document of the form `{"table": [{...}, ...], ...}`.
    ///
    /// Values of tables belonging to a registered entity are coerced to the
    /// declared column types; other tables (pivots) keep their JSON types.
    pub fn from_json(registry: &SchemaRegistry, document: &serde_json::Value) -> AppResult<Self> {
        let tables = document
            .as_object()
            .ok_or_else(|| AppError::validation("Dataset must be an object of table rows"))?;

        let schemas: HashMap<String, std::sync::Arc<EntitySchema>> = registry
            .names()
            .into_iter()
            .filter_map(|name| registry.get(name).ok())
            .map(|schema| (schema.table.clone(), schema))
            .collect();

        let mut database = Self::new();
        for (table, rows) in tables {
            let rows = rows.as_array().ok_or_else(|| {
                AppError::validation(format!("Dataset table '{table}' must be an array"))
            })?;
            for row in rows {
                let row = load_row(schemas.get(table).map(|schema| schema.as_ref()), table, row)?;
                database.insert(table, row);
            }
        }
        Ok(database)
    }

    /// Append a row to `table`.
    pub fn insert(&mut self, table: &str, row: Row) -> &mut Self {
        self.tables.entry(table.to_string()).or_default().push(row);
        self
    }

    /// All rows of `table`; an unknown table has none.
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run `query` and return the projected rows.
    pub fn execute(&self, query: &Query) -> Vec<Row> {
        let mut matched: Vec<(Vec<QueryValue>, Row)> = self
            .matching_frames(query)
            .into_iter()
            .map(|entries| {
                let scope = Scope::root(entries);
                let mut output = self.project(query, &scope);
                for item in query.aggregates() {
                    output.insert(item.alias.clone(), aggregate(self, item, &scope));
                }
                let keys = query
                    .orders()
                    .iter()
                    .map(|order| match &order.target {
                        OrderTarget::Column(column) => column_value(column, &scope),
                        OrderTarget::Alias(alias) => {
                            output.get(alias).cloned().unwrap_or(QueryValue::Null)
                        }
                    })
                    .collect();
                (keys, output)
            })
            .collect();

        if !query.orders().is_empty() {
            matched.sort_by(|(left, _), (right, _)| {
                for (index, order) in query.orders().iter().enumerate() {
                    let ordering = left[index].sort_cmp(&right[index]);
                    let ordering = match order.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    if ordering.is_ne() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let offset = query.offset_value().unwrap_or(0) as usize;
        let limit = query.limit_value().map_or(usize::MAX, |limit| limit as usize);
        matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, row)| row)
            .collect()
    }

    /// Number of rows `query` matches, ignoring limit and offset.
    pub fn count(&self, query: &Query) -> usize {
        self.matching_frames(query).len()
    }

    /// Primary keys of the rows `query` returns, in order.
    pub fn ids(&self, query: &Query) -> Vec<i64> {
        let primary_key = &query.entity().primary_key;
        self.execute(query)
            .iter()
            .filter_map(|row| match row.get(primary_key) {
                Some(QueryValue::Integer(id)) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Joined row combinations satisfying the query's constraints.
    fn matching_frames<'r>(&'r self, query: &'r Query) -> Vec<Vec<(&'r str, Option<&'r Row>)>> {
        let mut frames: Vec<Vec<(&str, Option<&Row>)>> = self
            .rows(&query.entity().table)
            .iter()
            .map(|row| vec![(query.qualifier(), Some(row))])
            .collect();

        for join in query.joins() {
            let mut joined = Vec::new();
            for frame in frames {
                let mut found = false;
                for candidate in self.rows(&join.table) {
                    let mut entries = frame.clone();
                    entries.push((join.alias.as_str(), Some(candidate)));
                    let scope = Scope::root(entries.clone());
                    let linked = column_value(&join.first, &scope)
                        .compare(&column_value(&join.second, &scope))
                        .is_some_and(|ordering| ordering.is_eq());
                    if linked
                        && join
                            .conditions
                            .iter()
                            .all(|condition| predicate_holds(self, condition, &scope))
                    {
                        found = true;
                        joined.push(entries);
                    }
                }
                if !found && join.kind == JoinKind::Left {
                    let mut entries = frame;
                    entries.push((join.alias.as_str(), None));
                    joined.push(entries);
                }
            }
            frames = joined;
        }

        frames
            .into_iter()
            .filter(|entries| constraints_hold(self, query, &Scope::root(entries.clone())))
            .collect()
    }

    fn project(&self, query: &Query, scope: &Scope<'_, '_>) -> Row {
        if query.selects().is_empty() {
            return scope
                .row(query.qualifier())
                .cloned()
                .unwrap_or_default();
        }
        query
            .selects()
            .iter()
            .map(|column| (column.output_name().to_string(), column_value(column, scope)))
            .collect()
    }
}

fn load_row(schema: Option<&EntitySchema>, table: &str, row: &serde_json::Value) -> AppResult<Row> {
    let object = row
        .as_object()
        .ok_or_else(|| AppError::validation(format!("Rows of '{table}' must be objects")))?;

    object
        .iter()
        .map(|(column, value)| -> AppResult<(String, QueryValue)> {
            let typed = match schema.and_then(|schema| schema.column_type(column)) {
                Some(column_type) => QueryValue::from_json(value, column_type).ok_or_else(|| {
                    AppError::validation(format!(
                        "Invalid value {value} for column '{table}.{column}'"
                    ))
                })?,
                None => infer(value),
            };
            Ok((column.clone(), typed))
        })
        .collect()
}

fn infer(value: &serde_json::Value) -> QueryValue {
    use serde_json::Value;
    match value {
        Value::Null => QueryValue::Null,
        Value::Bool(b) => QueryValue::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(QueryValue::Integer)
            .unwrap_or_else(|| QueryValue::Float(n.as_f64().unwrap_or_default())),
        Value::String(s) => QueryValue::Text(s.clone()),
        other => QueryValue::Text(other.to_string()),
    }
}

impl AggregateFunction {
    fn fold(&self, values: Vec<QueryValue>, matched: usize) -> QueryValue {
        let values: Vec<QueryValue> = values.into_iter().filter(|value| !value.is_null()).collect();
        match self {
            Self::Count => QueryValue::Integer(matched as i64),
            Self::Exists => QueryValue::Integer(i64::from(matched > 0)),
            Self::Min => values
                .into_iter()
                .min_by(|a, b| a.sort_cmp(b))
                .unwrap_or(QueryValue::Null),
            Self::Max => values
                .into_iter()
                .max_by(|a, b| a.sort_cmp(b))
                .unwrap_or(QueryValue::Null),
            Self::Sum | Self::Avg => {
                if values.is_empty() {
                    return QueryValue::Null;
                }
                let all_integers = values.iter().all(|value| matches!(value, QueryValue::Integer(_)));
                let total: f64 = values
                    .iter()
                    .map(|value| match value {
                        QueryValue::Integer(n) => *n as f64,
                        QueryValue::Float(n) => *n,
                        _ => 0.0,
                    })
                    .sum();
                match self {
                    Self::Sum if all_integers => QueryValue::Integer(total as i64),
                    Self::Sum => QueryValue::Float(total),
                    _ => QueryValue::Float(total / values.len() as f64),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builder::{Boolean, Column, CompareOp, Predicate};
    use crate::schema::{ColumnType, GlobalScope, Relation};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([
            EntitySchema::new("deals", "deals")
                .column("name", ColumnType::Text)
                .column("amount", ColumnType::Integer)
                .column("company_id", ColumnType::Integer)
                .column("deleted_at", ColumnType::DateTime)
                .relation("company", Relation::belongs_to("companies", "company_id"))
                .relation("activities", Relation::has_many("activities", "deal_id"))
                .scope(GlobalScope::soft_deletes("deleted_at")),
            EntitySchema::new("companies", "companies").column("name", ColumnType::Text),
            EntitySchema::new("activities", "activities")
                .column("deal_id", ColumnType::Integer)
                .column("kind", ColumnType::Text),
        ])
        .unwrap()
    }

    fn database(registry: &SchemaRegistry) -> MemoryDatabase {
        MemoryDatabase::from_json(
            registry,
            &json!({
                "deals": [
                    {"id": 1, "name": "Alpha", "amount": 100, "company_id": 10},
                    {"id": 2, "name": "Beta", "amount": null, "company_id": 11},
                    {"id": 3, "name": "Gamma", "amount": 300, "company_id": null},
                    {"id": 4, "name": "Deleted", "amount": 50, "company_id": 10, "deleted_at": "2024-01-01T00:00:00Z"}
                ],
                "companies": [
                    {"id": 10, "name": "Acme"},
                    {"id": 11, "name": "Globex"}
                ],
                "activities": [
                    {"id": 100, "deal_id": 1, "kind": "call"},
                    {"id": 101, "deal_id": 1, "kind": "email"},
                    {"id": 102, "deal_id": 3, "kind": "call"}
                ]
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_soft_deleted_rows_are_hidden_until_scope_removed() {
        let registry = registry();
        let db = database(&registry);
        let mut query = Query::new(registry.get("deals").unwrap());
        assert_eq!(db.ids(&query), vec![1, 2, 3]);

        query.without_global_scope("soft_deletes");
        assert_eq!(db.ids(&query), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_null_comparison_is_false_both_ways() {
        let registry = registry();
        let db = database(&registry);
        let mut query = Query::new(registry.get("deals").unwrap());
        query.where_column("amount", CompareOp::Ne, 100, Boolean::And);
        assert_eq!(db.ids(&query), vec![3]);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let registry = registry();
        let db = database(&registry);
        let mut query = Query::new(registry.get("deals").unwrap());
        query
            .where_column("name", CompareOp::Eq, "Alpha", Boolean::And)
            .where_column("name", CompareOp::Eq, "Beta", Boolean::Or)
            .where_column("amount", CompareOp::Gt, 1000, Boolean::And);
        assert_eq!(db.ids(&query), vec![1]);
    }

    #[test]
    fn test_exists_and_count() {
        let registry = registry();
        let db = database(&registry);
        let mut query = Query::new(registry.get("deals").unwrap());
        let (link, mut calls) = query.relation_query(&registry, "activities").unwrap();
        calls.where_column("kind", CompareOp::Eq, "call", Boolean::And);
        query.where_has(Boolean::And, link, calls, false);
        assert_eq!(db.ids(&query), vec![1, 3]);

        let mut query = Query::new(registry.get("deals").unwrap());
        let (link, activities) = query.relation_query(&registry, "activities").unwrap();
        query.where_count(Boolean::And, link, activities, CompareOp::Gte, 2);
        assert_eq!(db.ids(&query), vec![1]);
    }

    #[test]
    fn test_left_join_keeps_unmatched_rows_and_orders_nulls_first() {
        let registry = registry();
        let db = database(&registry);
        let mut query = Query::new(registry.get("deals").unwrap());
        let alias = query
            .join_relation_path(&registry, &["company".to_string()])
            .unwrap();
        query.order_by(
            OrderTarget::Column(Column::field(&alias, "name")),
            SortDirection::Desc,
        );
        assert_eq!(db.ids(&query), vec![2, 1, 3]);
    }

    #[test]
    fn test_aggregate_projection_and_paging() {
        let registry = registry();
        let db = database(&registry);
        let mut query = Query::new(registry.get("deals").unwrap());
        let alias = query.with_count(&registry, "activities").unwrap();
        query
            .order_by(OrderTarget::Alias(alias.clone()), SortDirection::Desc)
            .limit(2);

        let rows = db.execute(&query);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(&alias), Some(&QueryValue::Integer(2)));
        assert_eq!(rows[1].get(&alias), Some(&QueryValue::Integer(1)));
        assert_eq!(db.count(&query), 3);
    }

    #[test]
    fn test_like_is_case_insensitive() {
        let registry = registry();
        let db = database(&registry);
        let mut query = Query::new(registry.get("deals").unwrap());
        let column = query.column("name");
        query.where_clause(
            Boolean::And,
            Predicate::Like {
                column,
                pattern: "%ET%".into(),
                negated: false,
            },
        );
        assert_eq!(db.ids(&query), vec![2]);
    }

    #[test]
    fn test_rejects_ill_typed_dataset() {
        let registry = registry();
        let result = MemoryDatabase::from_json(&registry, &json!({"deals": [{"id": "x"}]}));
        assert!(result.is_err());
    }
}
