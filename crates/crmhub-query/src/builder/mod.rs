//! Storage-neutral query builder.
//!
//! A [`Query`] collects where clauses, joins, orders, projections and
//! aggregates for one entity. It is rendered to SQL by [`SqlGrammar`] and
//! executed directly by [`MemoryDatabase`](crate::memory::MemoryDatabase).
//! Global scopes of the entity are not stored as clauses; they are applied
//! at render/execution time unless removed with
//! [`Query::without_global_scope`].

pub mod grammar;
pub mod predicate;

use std::collections::BTreeSet;
use std::sync::Arc;

use crmhub_core::types::SortDirection;

use crate::error::CompileError;
use crate::schema::{
    ColumnType, EntitySchema, GlobalScope, LinkKind, RelationLink, SchemaRegistry,
    ScopeConstraint,
};
use crate::value::QueryValue;

pub use grammar::{CompiledSql, SqlGrammar};
pub use predicate::{Boolean, Column, CompareOp, Predicate, WhereClause};

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`.
    Inner,
    /// `LEFT JOIN`.
    Left,
}

impl JoinKind {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A join against another table under an alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join type.
    pub kind: JoinKind,
    /// Joined table.
    pub table: String,
    /// Alias the joined table is referenced by.
    pub alias: String,
    /// Column on an already present table.
    pub first: Column,
    /// Column on the joined table.
    pub second: Column,
    /// Extra `ON` conditions (global scopes of the joined entity).
    pub conditions: Vec<Predicate>,
}

/// What an order clause sorts by.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    /// A column.
    Column(Column),
    /// A projected alias, such as an aggregate.
    Alias(String),
}

/// An `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Sort key.
    pub target: OrderTarget,
    /// Direction.
    pub direction: SortDirection,
}

/// Aggregate function over a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Number of related rows.
    Count,
    /// Sum of a related column.
    Sum,
    /// Minimum of a related column.
    Min,
    /// Maximum of a related column.
    Max,
    /// Average of a related column.
    Avg,
    /// Whether any related row exists.
    Exists,
}

impl AggregateFunction {
    /// SQL function name.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
            Self::Exists => "EXISTS",
        }
    }

    /// Lower-case name used in aggregate aliases.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::Exists => "exists",
        }
    }
}

/// A projected aggregate over a relation (`comments_count`).
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Correlation with the parent row.
    pub link: RelationLink,
    /// Related rows aggregated over.
    pub query: Box<Query>,
    /// Function applied.
    pub function: AggregateFunction,
    /// Related column for sum/min/max/avg.
    pub column: Option<String>,
    /// Output alias.
    pub alias: String,
}

/// Builder for a query over one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    entity: Arc<EntitySchema>,
    alias: Option<String>,
    depth: usize,
    wheres: Vec<WhereClause>,
    joins: Vec<Join>,
    orders: Vec<Order>,
    selects: Vec<Column>,
    eager: Vec<String>,
    aggregates: Vec<Aggregate>,
    limit: Option<u64>,
    offset: Option<u64>,
    removed_scopes: BTreeSet<String>,
}

impl Query {
    /// Start a query on `entity`.
    pub fn new(entity: Arc<EntitySchema>) -> Self {
        Self {
            entity,
            alias: None,
            depth: 0,
            wheres: Vec::new(),
            joins: Vec::new(),
            orders: Vec::new(),
            selects: Vec::new(),
            eager: Vec::new(),
            aggregates: Vec::new(),
            limit: None,
            offset: None,
            removed_scopes: BTreeSet::new(),
        }
    }

    // --- Introspection ---

    /// The entity queried.
    pub fn entity(&self) -> &Arc<EntitySchema> {
        &self.entity
    }

    /// The table or alias columns of this query are qualified with.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.entity.table)
    }

    /// The alias of the table, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Nesting depth of correlated sub-queries.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Where clauses added so far.
    pub fn wheres(&self) -> &[WhereClause] {
        &self.wheres
    }

    /// Whether any where clause was added.
    pub fn has_wheres(&self) -> bool {
        !self.wheres.is_empty()
    }

    /// Joins added so far.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Order clauses.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Explicit projection; empty means all columns of the entity.
    pub fn selects(&self) -> &[Column] {
        &self.selects
    }

    /// Relations requested for eager loading.
    pub fn eager_loads(&self) -> &[String] {
        &self.eager
    }

    /// Projected aggregates.
    pub fn aggregates(&self) -> &[Aggregate] {
        &self.aggregates
    }

    /// Row limit.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Row offset.
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Names of removed global scopes.
    pub fn removed_scopes(&self) -> &BTreeSet<String> {
        &self.removed_scopes
    }

    /// Whether the named global scope was removed.
    pub fn is_scope_removed(&self, name: &str) -> bool {
        self.removed_scopes.contains(name)
    }

    /// Global scopes still in effect.
    pub fn active_scopes(&self) -> impl Iterator<Item = &GlobalScope> {
        self.entity
            .scopes
            .iter()
            .filter(|scope| !self.removed_scopes.contains(&scope.name))
    }

    /// Predicates of the global scopes still in effect.
    pub fn scope_predicates(&self) -> Vec<Predicate> {
        self.active_scopes()
            .map(|scope| scope_predicate(scope, &self.entity, self.qualifier()))
            .collect()
    }

    // --- Columns and sub-builders ---

    /// A column of this query's entity.
    pub fn column(&self, name: &str) -> Column {
        Column::field(self.qualifier(), name)
    }

    /// A timestamp assembled from a date and a time column.
    pub fn date_time_column(&self, date: &str, time: &str) -> Column {
        Column::DateTimeParts {
            qualifier: self.qualifier().to_string(),
            date: date.to_string(),
            time: time.to_string(),
        }
    }

    /// An empty builder on the same entity and qualifier, used to collect a
    /// parenthesised group.
    pub fn nested(&self) -> Self {
        let mut nested = Self::new(Arc::clone(&self.entity));
        nested.alias = self.alias.clone();
        nested.depth = self.depth;
        nested
    }

    /// A builder for the related entity of `relation`, correlated with this
    /// query. The related table is aliased when it would otherwise shadow
    /// this query's qualifier.
    pub fn relation_query(
        &self,
        registry: &SchemaRegistry,
        relation: &str,
    ) -> Result<(RelationLink, Self), CompileError> {
        let (found, related) = registry.related(&self.entity, relation)?;
        let depth = self.depth + 1;
        let alias = (related.table == self.qualifier()).then(|| format!("{}_{depth}", related.table));

        let mut query = Self::new(Arc::clone(&related));
        query.alias = alias;
        query.depth = depth;

        let link = found.link(relation, self.qualifier(), &related.table, query.qualifier());
        Ok((link, query))
    }

    // --- Where clauses ---

    /// Append a predicate.
    pub fn where_clause(&mut self, boolean: Boolean, predicate: Predicate) -> &mut Self {
        self.wheres.push(WhereClause { boolean, predicate });
        self
    }

    /// Append `column op value` on a column of this entity.
    pub fn where_column(
        &mut self,
        column: &str,
        op: CompareOp,
        value: impl Into<QueryValue>,
        boolean: Boolean,
    ) -> &mut Self {
        let column = self.column(column);
        self.where_clause(boolean, Predicate::compare(column, op, value))
    }

    /// Append `column IS [NOT] NULL` on a column of this entity.
    pub fn where_null(&mut self, column: &str, negated: bool, boolean: Boolean) -> &mut Self {
        let column = self.column(column);
        self.where_clause(boolean, Predicate::Null { column, negated })
    }

    /// Append the clauses of `nested` as one parenthesised group. An empty
    /// group adds nothing; a single clause is added without parentheses.
    ///
    /// Joins, aggregates, eager loads and orders the group added are kept;
    /// joins and aggregates are deduplicated by alias.
    pub fn add_nested(&mut self, boolean: Boolean, nested: Self) -> &mut Self {
        for join in nested.joins {
            self.join(join);
        }
        for aggregate in nested.aggregates {
            if !self.aggregates.iter().any(|existing| existing.alias == aggregate.alias) {
                self.aggregates.push(aggregate);
            }
        }
        for relation in nested.eager {
            if !self.eager.contains(&relation) {
                self.eager.push(relation);
            }
        }
        self.orders.extend(nested.orders);

        let mut wheres = nested.wheres;
        match wheres.len() {
            0 => self,
            1 => {
                let clause = wheres.remove(0);
                self.where_clause(boolean, clause.predicate)
            }
            _ => self.where_clause(boolean, Predicate::Nested(wheres)),
        }
    }

    /// Correlated `[NOT] EXISTS` over a relation.
    pub fn where_has(
        &mut self,
        boolean: Boolean,
        link: RelationLink,
        query: Self,
        negated: bool,
    ) -> &mut Self {
        self.where_clause(
            boolean,
            Predicate::Exists {
                link,
                query: Box::new(query),
                negated,
            },
        )
    }

    /// Correlated count of related rows compared with `value`.
    pub fn where_count(
        &mut self,
        boolean: Boolean,
        link: RelationLink,
        query: Self,
        op: CompareOp,
        value: i64,
    ) -> &mut Self {
        self.where_clause(
            boolean,
            Predicate::Count {
                link,
                query: Box::new(query),
                op,
                value,
            },
        )
    }

    // --- Scopes ---

    /// Remove a global scope from this query.
    pub fn without_global_scope(&mut self, name: impl Into<String>) -> &mut Self {
        self.removed_scopes.insert(name.into());
        self
    }

    /// Remove every scope `other` removed.
    pub fn inherit_removed_scopes(&mut self, other: &Self) -> &mut Self {
        self.removed_scopes
            .extend(other.removed_scopes.iter().cloned());
        self
    }

    // --- Joins ---

    /// Add a join unless one with the same alias exists. Returns whether
    /// the join was added.
    pub fn join(&mut self, join: Join) -> bool {
        if self.has_join(&join.alias) {
            return false;
        }
        self.joins.push(join);
        true
    }

    /// Whether a join with `alias` exists.
    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|join| join.alias == alias)
    }

    /// Left join every relation on a to-one path and return the alias of
    /// the last one. Aliases are the relation path joined with `_`, so the
    /// same path is only ever joined once.
    pub fn join_relation_path(
        &mut self,
        registry: &SchemaRegistry,
        relations: &[String],
    ) -> Result<String, CompileError> {
        let mut parent_qualifier = self.qualifier().to_string();
        let mut parent = Arc::clone(&self.entity);

        for (index, relation) in relations.iter().enumerate() {
            let (found, related) = registry.related(&parent, relation)?;
            if !found.is_to_one() {
                return Err(CompileError::RelationNotJoinable {
                    relation: relations[..=index].join("."),
                });
            }

            let alias = relations[..=index].join("_");
            let link = found.link(relation, &parent_qualifier, &related.table, &alias);
            if let LinkKind::Direct {
                parent_column,
                related_column,
            } = &link.kind
            {
                let conditions = related
                    .scopes
                    .iter()
                    .map(|scope| scope_predicate(scope, &related, &alias))
                    .collect();
                self.join(Join {
                    kind: JoinKind::Left,
                    table: related.table.clone(),
                    alias: alias.clone(),
                    first: Column::field(&parent_qualifier, parent_column),
                    second: Column::field(&alias, related_column),
                    conditions,
                });
            }

            parent_qualifier = alias;
            parent = related;
        }

        Ok(parent_qualifier)
    }

    // --- Ordering, projection, paging ---

    /// Append an order clause.
    pub fn order_by(&mut self, target: OrderTarget, direction: SortDirection) -> &mut Self {
        self.orders.push(Order { target, direction });
        self
    }

    /// Order by a column of this entity.
    pub fn order_by_column(&mut self, column: &str, direction: SortDirection) -> &mut Self {
        let column = self.column(column);
        self.order_by(OrderTarget::Column(column), direction)
    }

    /// Drop every order clause.
    pub fn forget_orders(&mut self) -> &mut Self {
        self.orders.clear();
        self
    }

    /// Project the given columns of this entity.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            let column = self.column(column.as_ref());
            if !self.selects.contains(&column) {
                self.selects.push(column);
            }
        }
        self
    }

    /// Request eager loading of relations.
    pub fn with<I, S>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for relation in relations {
            let relation = relation.into();
            if !self.eager.contains(&relation) {
                self.eager.push(relation);
            }
        }
        self
    }

    /// Project an aggregate over a relation. The alias follows the
    /// `{relation}_{function}[_{column}]` convention.
    pub fn with_aggregate(
        &mut self,
        registry: &SchemaRegistry,
        relation: &str,
        function: AggregateFunction,
        column: Option<&str>,
    ) -> Result<String, CompileError> {
        let alias = match column {
            Some(column) => format!("{relation}_{}_{column}", function.as_str()),
            None => format!("{relation}_{}", function.as_str()),
        };
        if self.aggregates.iter().any(|aggregate| aggregate.alias == alias) {
            return Ok(alias);
        }

        let (link, query) = self.relation_query(registry, relation)?;
        if let Some(column) = column {
            if !query.entity().has_column(column) {
                return Err(CompileError::UnknownColumn {
                    entity: query.entity().name.clone(),
                    column: column.to_string(),
                });
            }
        }

        self.aggregates.push(Aggregate {
            link,
            query: Box::new(query),
            function,
            column: column.map(str::to_string),
            alias: alias.clone(),
        });
        Ok(alias)
    }

    /// Project the number of related rows as `{relation}_count`.
    pub fn with_count(
        &mut self,
        registry: &SchemaRegistry,
        relation: &str,
    ) -> Result<String, CompileError> {
        self.with_aggregate(registry, relation, AggregateFunction::Count, None)
    }

    /// Limit the number of rows.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Limit and offset for a 1-based page.
    pub fn for_page(&mut self, page: u64, per_page: u64) -> &mut Self {
        self.offset(page.saturating_sub(1) * per_page).limit(per_page)
    }
}

/// Predicate enforcing a global scope on rows qualified by `qualifier`.
pub fn scope_predicate(scope: &GlobalScope, entity: &EntitySchema, qualifier: &str) -> Predicate {
    match &scope.constraint {
        ScopeConstraint::SoftDeletes { column } => Predicate::Null {
            column: Column::field(qualifier, column),
            negated: false,
        },
        ScopeConstraint::Equals { column, value } => {
            let column_type = entity.column_type(column).unwrap_or(ColumnType::Text);
            let value = QueryValue::from_json(value, column_type).unwrap_or(QueryValue::Null);
            if value.is_null() {
                Predicate::Null {
                    column: Column::field(qualifier, column),
                    negated: false,
                }
            } else {
                Predicate::eq(Column::field(qualifier, column), value)
            }
        }
    }
}
