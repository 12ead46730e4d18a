//! SQL rendering of a [`Query`] for each supported driver.

use crmhub_core::config::Driver;
use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;

use crate::schema::{LinkKind, RelationLink};
use crate::value::QueryValue;

use super::{AggregateFunction, Column, OrderTarget, Predicate, Query, WhereClause};

/// Rendered SQL with positional bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    /// SQL text with driver placeholders.
    pub sql: String,
    /// Values for the placeholders, in order.
    pub bindings: Vec<QueryValue>,
}

/// Renders queries for one driver.
#[derive(Debug, Clone, Copy)]
pub struct SqlGrammar {
    driver: Driver,
}

impl SqlGrammar {
    /// Create a grammar for `driver`.
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }

    /// The driver rendered for.
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Render a full `SELECT` statement.
    pub fn compile_select(&self, query: &Query) -> AppResult<CompiledSql> {
        let mut writer = Writer::new(self.driver);
        let sql = writer.select(query)?;
        Ok(CompiledSql {
            sql,
            bindings: writer.bindings,
        })
    }

    /// Render only the `WHERE` condition (scopes included). Empty when the
    /// query has no constraint at all.
    pub fn compile_where(&self, query: &Query) -> AppResult<CompiledSql> {
        let mut writer = Writer::new(self.driver);
        let sql = writer.constraints(query, true)?.join(" AND ");
        Ok(CompiledSql {
            sql,
            bindings: writer.bindings,
        })
    }
}

struct Writer {
    driver: Driver,
    bindings: Vec<QueryValue>,
}

impl Writer {
    fn new(driver: Driver) -> Self {
        Self {
            driver,
            bindings: Vec::new(),
        }
    }

    fn wrap(&self, identifier: &str) -> String {
        match self.driver {
            Driver::Postgres | Driver::Sqlite => format!("\"{}\"", identifier.replace('"', "\"\"")),
            Driver::MySql => format!("`{}`", identifier.replace('`', "``")),
            Driver::SqlServer => format!("[{}]", identifier.replace(']', "]]")),
        }
    }

    fn wrap_qualified(&self, qualifier: &str, name: &str) -> String {
        format!("{}.{}", self.wrap(qualifier), self.wrap(name))
    }

    fn wrap_table(&self, table: &str, alias: Option<&str>) -> String {
        match alias {
            Some(alias) if alias != table => format!("{} AS {}", self.wrap(table), self.wrap(alias)),
            _ => self.wrap(table),
        }
    }

    fn column(&self, column: &Column) -> AppResult<String> {
        match column {
            Column::Field { qualifier, name } => Ok(self.wrap_qualified(qualifier, name)),
            Column::DateTimeParts {
                qualifier,
                date,
                time,
            } => {
                let date = self.wrap_qualified(qualifier, date);
                let time = format!("COALESCE({}, '00:00:00')", self.wrap_qualified(qualifier, time));
                match self.driver {
                    Driver::Postgres => Ok(format!("CAST(CONCAT({date}, ' ', {time}) AS TIMESTAMP)")),
                    Driver::MySql => Ok(format!("CAST(CONCAT({date}, ' ', {time}) AS DATETIME)")),
                    Driver::Sqlite => Ok(format!("DATETIME({date} || ' ' || {time})")),
                    Driver::SqlServer => Err(AppError::not_implemented(format!(
                        "Unsupported database driver [{}] for date/time column filters",
                        self.driver
                    ))),
                }
            }
        }
    }

    fn param(&mut self, value: &QueryValue) -> String {
        self.bindings.push(value.clone());
        match self.driver {
            Driver::Postgres => format!("${}", self.bindings.len()),
            _ => "?".to_string(),
        }
    }

    fn select(&mut self, query: &Query) -> AppResult<String> {
        let mut columns: Vec<String> = if query.selects().is_empty() {
            vec![format!("{}.*", self.wrap(query.qualifier()))]
        } else {
            query
                .selects()
                .iter()
                .map(|column| self.column(column))
                .collect::<AppResult<_>>()?
        };

        for aggregate in query.aggregates() {
            let body = self.relation_body(&aggregate.link, &aggregate.query)?;
            let expression = match aggregate.function {
                AggregateFunction::Exists => {
                    format!("CASE WHEN EXISTS (SELECT * {body}) THEN 1 ELSE 0 END")
                }
                AggregateFunction::Count => format!("(SELECT COUNT(*) {body})"),
                function => {
                    let column = aggregate.column.as_deref().unwrap_or("id");
                    format!(
                        "(SELECT {}({}) {body})",
                        function.as_sql(),
                        self.wrap_qualified(aggregate.query.qualifier(), column)
                    )
                }
            };
            columns.push(format!("{expression} AS {}", self.wrap(&aggregate.alias)));
        }

        let top = match (self.driver, query.limit_value(), query.offset_value()) {
            (Driver::SqlServer, Some(limit), None) => format!("TOP {limit} "),
            _ => String::new(),
        };

        let mut sql = format!(
            "SELECT {top}{} FROM {}",
            columns.join(", "),
            self.wrap_table(&query.entity().table, query.alias())
        );

        for join in query.joins() {
            let mut on = vec![format!(
                "{} = {}",
                self.column(&join.first)?,
                self.column(&join.second)?
            )];
            for condition in &join.conditions {
                on.push(self.predicate(condition)?);
            }
            sql.push_str(&format!(
                " {} {} ON {}",
                join.kind.as_sql(),
                self.wrap_table(&join.table, Some(&join.alias)),
                on.join(" AND ")
            ));
        }

        let constraints = self.constraints(query, true)?;
        if !constraints.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&constraints.join(" AND "));
        }

        let mut orders = Vec::with_capacity(query.orders().len());
        for order in query.orders() {
            let target = match &order.target {
                OrderTarget::Column(column) => self.column(column)?,
                OrderTarget::Alias(alias) => self.wrap(alias),
            };
            orders.push(format!("{target} {}", order.direction.as_sql()));
        }
        if !orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        match self.driver {
            Driver::SqlServer => {
                if let Some(offset) = query.offset_value() {
                    if orders.is_empty() {
                        sql.push_str(" ORDER BY (SELECT 0)");
                    }
                    sql.push_str(&format!(" OFFSET {offset} ROWS"));
                    if let Some(limit) = query.limit_value() {
                        sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                    }
                }
            }
            _ => {
                if let Some(limit) = query.limit_value() {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }
                if let Some(offset) = query.offset_value() {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
        }

        Ok(sql)
    }

    /// Scope predicates followed by the query's own clauses, each element
    /// meant to be joined with `AND`. Unless `alone` says nothing else is
    /// ANDed to the result, several clauses are parenthesised.
    fn constraints(&mut self, query: &Query, alone: bool) -> AppResult<Vec<String>> {
        let mut parts = Vec::new();
        for scope in query.scope_predicates() {
            parts.push(self.predicate(&scope)?);
        }
        if query.has_wheres() {
            let clauses = self.clauses(query.wheres())?;
            if (alone && parts.is_empty()) || query.wheres().len() == 1 {
                parts.push(clauses);
            } else {
                parts.push(format!("({clauses})"));
            }
        }
        Ok(parts)
    }

    fn clauses(&mut self, clauses: &[WhereClause]) -> AppResult<String> {
        let mut sql = String::new();
        for (index, clause) in clauses.iter().enumerate() {
            if index > 0 {
                sql.push(' ');
                sql.push_str(clause.boolean.as_sql());
                sql.push(' ');
            }
            sql.push_str(&self.predicate(&clause.predicate)?);
        }
        Ok(sql)
    }

    fn predicate(&mut self, predicate: &Predicate) -> AppResult<String> {
        Ok(match predicate {
            Predicate::Compare { column, op, value } => {
                let column = self.column(column)?;
                format!("{column} {} {}", op.as_sql(), self.param(value))
            }
            Predicate::Like {
                column,
                pattern,
                negated,
            } => {
                let column = self.column(column)?;
                let keyword = match (self.driver, negated) {
                    (Driver::Postgres, false) => "ILIKE",
                    (Driver::Postgres, true) => "NOT ILIKE",
                    (_, false) => "LIKE",
                    (_, true) => "NOT LIKE",
                };
                format!("{column} {keyword} {}", self.param(&QueryValue::Text(pattern.clone())))
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let column = self.column(column)?;
                let placeholders: Vec<String> = values.iter().map(|value| self.param(value)).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{column} {keyword} ({})", placeholders.join(", "))
            }
            Predicate::Null { column, negated } => {
                let column = self.column(column)?;
                if *negated {
                    format!("{column} IS NOT NULL")
                } else {
                    format!("{column} IS NULL")
                }
            }
            Predicate::Empty { column, negated } => {
                let column = self.column(column)?;
                let empty = self.param(&QueryValue::Text(String::new()));
                if *negated {
                    format!("({column} IS NOT NULL AND {column} <> {empty})")
                } else {
                    format!("({column} IS NULL OR {column} = {empty})")
                }
            }
            Predicate::Between {
                column,
                low,
                high,
                negated,
            } => {
                let column = self.column(column)?;
                let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                let low = self.param(low);
                let high = self.param(high);
                format!("{column} {keyword} {low} AND {high}")
            }
            Predicate::Nested(clauses) => {
                if clauses.is_empty() {
                    "1 = 1".to_string()
                } else {
                    format!("({})", self.clauses(clauses)?)
                }
            }
            Predicate::Exists {
                link,
                query,
                negated,
            } => {
                let body = self.relation_body(link, query)?;
                let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
                format!("{keyword} (SELECT * {body})")
            }
            Predicate::Count {
                link,
                query,
                op,
                value,
            } => {
                let body = self.relation_body(link, query)?;
                let value = self.param(&QueryValue::Integer(*value));
                format!("(SELECT COUNT(*) {body}) {} {value}", op.as_sql())
            }
            Predicate::Const(true) => "1 = 1".to_string(),
            Predicate::Const(false) => "1 = 0".to_string(),
        })
    }

    /// `FROM ... WHERE ...` of a correlated sub-query.
    fn relation_body(&mut self, link: &RelationLink, query: &Query) -> AppResult<String> {
        let mut from = self.wrap_table(&link.related_table, query.alias());
        let mut conditions = Vec::new();

        match &link.kind {
            LinkKind::Direct {
                parent_column,
                related_column,
            } => {
                conditions.push(format!(
                    "{} = {}",
                    self.wrap_qualified(&link.related, related_column),
                    self.wrap_qualified(&link.parent, parent_column)
                ));
            }
            LinkKind::Pivot {
                table,
                parent_pivot_column,
                related_pivot_column,
                parent_column,
                related_column,
                morph,
            } => {
                from.push_str(&format!(
                    " INNER JOIN {} ON {} = {}",
                    self.wrap(table),
                    self.wrap_qualified(&link.related, related_column),
                    self.wrap_qualified(table, related_pivot_column)
                ));
                conditions.push(format!(
                    "{} = {}",
                    self.wrap_qualified(table, parent_pivot_column),
                    self.wrap_qualified(&link.parent, parent_column)
                ));
                if let Some(morph) = morph {
                    let column = self.wrap_qualified(table, &morph.column);
                    let value = self.param(&QueryValue::Text(morph.value.clone()));
                    conditions.push(format!("{column} = {value}"));
                }
            }
        }

        conditions.extend(self.constraints(query, false)?);
        Ok(format!("FROM {from} WHERE {}", conditions.join(" AND ")))
    }
}
