use chrono::NaiveTime;
use regex::RegexBuilder;

use crate::builder::{Aggregate, Boolean, Column, Predicate, Query, WhereClause};
use crate::schema::{LinkKind, RelationLink};
use crate::value::QueryValue;

use super::{MemoryDatabase, Row};

/// Rows visible to a predicate: the current frame plus, for correlated
/// sub-queries, the enclosing frames.
pub(super) struct Scope<'r, 'p> {
    entries: Vec<(&'r str, Option<&'r Row>)>,
    parent: Option<&'p Scope<'r, 'p>>,
}

impl<'r, 'p> Scope<'r, 'p> {
    pub(super) fn root(entries: Vec<(&'r str, Option<&'r Row>)>) -> Self {
        Self {
            entries,
            parent: None,
        }
    }

    fn child(&'p self, entries: Vec<(&'r str, Option<&'r Row>)>) -> Self {
        Self {
            entries,
            parent: Some(self),
        }
    }

    /// The row bound to `qualifier`; `None` for unbound or null-extended.
    pub(super) fn row(&self, qualifier: &str) -> Option<&'r Row> {
        match self.entries.iter().rev().find(|(name, _)| *name == qualifier) {
            Some((_, row)) => *row,
            None => self.parent.and_then(|parent| parent.row(qualifier)),
        }
    }
}

pub(super) fn column_value(column: &Column, scope: &Scope<'_, '_>) -> QueryValue {
    match column {
        Column::Field { qualifier, name } => scope
            .row(qualifier)
            .and_then(|row| row.get(name))
            .cloned()
            .unwrap_or(QueryValue::Null),
        Column::DateTimeParts {
            qualifier,
            date,
            time,
        } => {
            let Some(row) = scope.row(qualifier) else {
                return QueryValue::Null;
            };
            let date = match row.get(date) {
                Some(QueryValue::Date(date)) => *date,
                Some(QueryValue::DateTime(instant)) => instant.date_naive(),
                _ => return QueryValue::Null,
            };
            let time = match row.get(time) {
                Some(QueryValue::Text(text)) => NaiveTime::parse_from_str(text, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
                    .unwrap_or(NaiveTime::MIN),
                _ => NaiveTime::MIN,
            };
            QueryValue::DateTime(date.and_time(time).and_utc())
        }
    }
}

/// Scopes and where clauses of `query` against the current frame.
pub(super) fn constraints_hold(db: &MemoryDatabase, query: &Query, scope: &Scope<'_, '_>) -> bool {
    query
        .scope_predicates()
        .iter()
        .all(|predicate| predicate_holds(db, predicate, scope))
        && clauses_hold(db, query.wheres(), scope)
}

/// Clauses with SQL precedence: `AND` binds tighter than `OR`.
fn clauses_hold(db: &MemoryDatabase, clauses: &[WhereClause], scope: &Scope<'_, '_>) -> bool {
    if clauses.is_empty() {
        return true;
    }

    let mut any_group = false;
    let mut group = true;
    for (index, clause) in clauses.iter().enumerate() {
        if index > 0 && clause.boolean == Boolean::Or {
            any_group |= group;
            group = true;
        }
        group = group && predicate_holds(db, &clause.predicate, scope);
    }
    any_group || group
}

pub(super) fn predicate_holds(db: &MemoryDatabase, predicate: &Predicate, scope: &Scope<'_, '_>) -> bool {
    match predicate {
        Predicate::Compare { column, op, value } => column_value(column, scope)
            .compare(value)
            .is_some_and(|ordering| op.matches(ordering)),
        Predicate::Like {
            column,
            pattern,
            negated,
        } => match column_value(column, scope).as_text() {
            Some(text) => like(&text, pattern) != *negated,
            None => false,
        },
        Predicate::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                return *negated;
            }
            let current = column_value(column, scope);
            if current.is_null() {
                return false;
            }
            let found = values
                .iter()
                .any(|value| current.compare(value).is_some_and(|ordering| ordering.is_eq()));
            found != *negated
        }
        Predicate::Null { column, negated } => column_value(column, scope).is_null() != *negated,
        Predicate::Empty { column, negated } => {
            let empty = match column_value(column, scope) {
                QueryValue::Null => true,
                QueryValue::Text(text) => text.is_empty(),
                _ => false,
            };
            empty != *negated
        }
        Predicate::Between {
            column,
            low,
            high,
            negated,
        } => {
            let current = column_value(column, scope);
            match (current.compare(low), current.compare(high)) {
                (Some(lower), Some(upper)) => (lower.is_ge() && upper.is_le()) != *negated,
                _ => false,
            }
        }
        Predicate::Nested(clauses) => clauses_hold(db, clauses, scope),
        Predicate::Exists {
            link,
            query,
            negated,
        } => matching_related(db, link, query, scope).next().is_some() != *negated,
        Predicate::Count {
            link,
            query,
            op,
            value,
        } => {
            let count = matching_related(db, link, query, scope).count() as i64;
            op.matches(count.cmp(value))
        }
        Predicate::Const(value) => *value,
    }
}

/// Projected aggregate for the current frame.
pub(super) fn aggregate(db: &MemoryDatabase, aggregate: &Aggregate, scope: &Scope<'_, '_>) -> QueryValue {
    let rows: Vec<&Row> = matching_related(db, &aggregate.link, &aggregate.query, scope).collect();
    let values = match &aggregate.column {
        Some(column) => rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(QueryValue::Null))
            .collect(),
        None => Vec::new(),
    };
    aggregate.function.fold(values, rows.len())
}

/// Related rows of a correlated sub-query. A pivot relation yields one
/// item per pivot row, like the SQL join it renders to.
fn matching_related<'a>(
    db: &'a MemoryDatabase,
    link: &'a RelationLink,
    query: &'a Query,
    scope: &'a Scope<'_, '_>,
) -> impl Iterator<Item = &'a Row> + 'a {
    let parent = scope.row(&link.parent);
    let candidates: Vec<&'a Row> = match (&link.kind, parent) {
        (_, None) => Vec::new(),
        (
            LinkKind::Direct {
                parent_column,
                related_column,
            },
            Some(parent),
        ) => {
            let key = parent.get(parent_column).cloned().unwrap_or(QueryValue::Null);
            db.rows(&link.related_table)
                .iter()
                .filter(|row| equal(row.get(related_column), &key))
                .collect()
        }
        (
            LinkKind::Pivot {
                table,
                parent_pivot_column,
                related_pivot_column,
                parent_column,
                related_column,
                morph,
            },
            Some(parent),
        ) => {
            let key = parent.get(parent_column).cloned().unwrap_or(QueryValue::Null);
            db.rows(table)
                .iter()
                .filter(|pivot| equal(pivot.get(parent_pivot_column), &key))
                .filter(|pivot| match morph {
                    Some(morph) => equal(pivot.get(&morph.column), &QueryValue::Text(morph.value.clone())),
                    None => true,
                })
                .flat_map(|pivot| {
                    let related_key = pivot.get(related_pivot_column).cloned().unwrap_or(QueryValue::Null);
                    db.rows(&link.related_table)
                        .iter()
                        .filter(move |row| equal(row.get(related_column), &related_key))
                })
                .collect()
        }
    };

    candidates.into_iter().filter(move |row| {
        let child = scope.child(vec![(query.qualifier(), Some(*row))]);
        constraints_hold(db, query, &child)
    })
}

fn equal(value: Option<&QueryValue>, key: &QueryValue) -> bool {
    value
        .and_then(|value| value.compare(key))
        .is_some_and(|ordering| ordering.is_eq())
}

/// Case-insensitive SQL `LIKE` with `%` and `_` wildcards.
fn like(text: &str, pattern: &str) -> bool {
    let mut expression = String::from("^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                expression.push_str(&regex::escape(&literal));
                literal.clear();
                expression.push_str(if ch == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    expression.push_str(&regex::escape(&literal));
    expression.push('$');

    RegexBuilder::new(&expression)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .is_ok_and(|regex| regex.is_match(text))
}
