//! Compilation of rule trees into predicates.
//!
//! The [`Parser`] walks a [`RuleTree`] depth first. Each group becomes one
//! parenthesised clause, each usable leaf exactly one clause, so the boolean
//! structure of the tree survives precedence. Leaves on related fields
//! become correlated `EXISTS` sub-queries, which never multiply rows; the
//! [`JoinRelationParser`] instead resolves to-one relation fields through
//! joins precomputed on the outer query.

pub mod join;
pub mod operators;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::builder::{Boolean, Column, Predicate, Query};
use crate::context::CompileContext;
use crate::error::CompileError;
use crate::filters::{Filter, FilterSet, FilterType, Operator};
use crate::rules::{RuleGroup, RuleLeaf, RuleNode, RuleTree};
use crate::schema::{ColumnType, SchemaRegistry};
use crate::value::QueryValue;

pub use join::JoinRelationParser;
pub use operators::{Operation, build_predicate, list_values};

use operators::{column_type_for, compare_op};

/// Common contract of the parsers.
pub trait RuleParser {
    /// Prepare the outer query before compilation (add joins).
    fn prepare(&self, _query: &mut Query) -> Result<(), CompileError> {
        Ok(())
    }

    /// Compile the children of the tree's root group into `query`.
    fn parse(&self, tree: &RuleTree, query: &mut Query) -> Result<(), CompileError>;
}

/// Relation path (`company.owner`) to the alias it is joined under.
pub type JoinMap = BTreeMap<String, JoinTarget>;

/// A precomputed join of a to-one relation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTarget {
    /// Relations walked from the root entity.
    pub relations: Vec<String>,
    /// Alias of the last joined table.
    pub alias: String,
}

/// Compiles rule trees against a set of filters.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    filters: &'a FilterSet,
    registry: &'a SchemaRegistry,
    context: &'a CompileContext,
    joins: Option<JoinMap>,
}

impl<'a> Parser<'a> {
    pub fn new(filters: &'a FilterSet, registry: &'a SchemaRegistry, context: &'a CompileContext) -> Self {
        Self {
            filters,
            registry,
            context,
            joins: None,
        }
    }

    pub(crate) fn with_joins(mut self, joins: JoinMap) -> Self {
        self.joins = Some(joins);
        self
    }

    pub fn filters(&self) -> &'a FilterSet {
        self.filters
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    pub fn context(&self) -> &'a CompileContext {
        self.context
    }

    /// Joins used for relation fields, when compiling with joins.
    pub fn joins(&self) -> Option<&JoinMap> {
        self.joins.as_ref()
    }

    /// Compile the children of `group` into `query`, combined with the
    /// group's condition.
    pub fn compile_group(&self, group: &RuleGroup, query: &mut Query) -> Result<(), CompileError> {
        let boolean = Boolean::from(group.condition);
        for child in &group.children {
            match child {
                RuleNode::Group(inner) => {
                    let mut nested = query.nested();
                    self.compile_group(inner, &mut nested)?;
                    query.inherit_removed_scopes(&nested);
                    query.add_nested(boolean, nested);
                }
                RuleNode::Rule(leaf) => match self.compile_leaf(leaf, boolean, query) {
                    Ok(()) => {}
                    Err(err) if !self.context.is_strict() => {
                        debug!(
                            field = %leaf.rule,
                            operator = %leaf.operator,
                            error = %err,
                            "Skipping rule"
                        );
                    }
                    Err(err) => return Err(err),
                },
            }
        }
        Ok(())
    }

    /// Compile one leaf into at most one clause of `query`.
    pub fn compile_leaf(&self, leaf: &RuleLeaf, boolean: Boolean, query: &mut Query) -> Result<(), CompileError> {
        let filter = self
            .filters
            .get(&leaf.rule)
            .filter(|filter| filter.is_authorized())
            .ok_or_else(|| CompileError::UnknownFilter {
                field: leaf.rule.clone(),
            })?;
        let operator = Operator::parse_token(&leaf.operator).ok_or_else(|| CompileError::OperatorNotAllowed {
            field: leaf.rule.clone(),
            operator: leaf.operator.clone(),
        })?;

        let operand = if filter.filter_type().uses_operands() {
            let operand = leaf
                .operand
                .as_deref()
                .and_then(|value| filter.find_operand(value))
                .ok_or_else(|| CompileError::InvalidOperand {
                    field: leaf.rule.clone(),
                    operand: leaf.operand.clone(),
                })?;
            Some(operand)
        } else {
            None
        };

        let allowed = match operand {
            Some(operand) => filter.allows_with_operand(operand, operator),
            None => filter.allows(operator),
        };
        if !allowed {
            return Err(CompileError::OperatorNotAllowed {
                field: leaf.rule.clone(),
                operator: leaf.operator.clone(),
            });
        }

        let target = operand.map(|operand| operand.filter()).unwrap_or(filter);
        let custom = filter.custom_predicate().or_else(|| target.custom_predicate());
        if let Some(custom) = custom {
            let mut nested = query.nested();
            custom.apply(&mut nested, &leaf.value, boolean, operator, leaf, self)?;
            query.inherit_removed_scopes(&nested);
            query.add_nested(boolean, nested);
            return Ok(());
        }

        if filter.filter_type() == FilterType::HasMany {
            let relation = filter
                .relation()
                .ok_or_else(|| CompileError::descriptor(filter.id(), "a has-many filter requires a relation"))?;
            let field = operand.map(|operand| operand.value()).unwrap_or(filter.field());
            let (link, mut related) = query.relation_query(self.registry, relation)?;
            if let Some(predicate) = self.field_predicate(&related, field, target, operator, &leaf.value)? {
                related.where_clause(Boolean::And, predicate);
                query.where_has(boolean, link, related, false);
            }
            return Ok(());
        }

        if let Some(relation) = filter.countable() {
            return self.compile_count(query, filter, relation, operator, &leaf.value, boolean);
        }

        if filter.filter_type() == FilterType::Tags {
            return self.compile_tags(query, filter, operator, &leaf.value, boolean);
        }

        let field = operand.map(|operand| operand.value()).unwrap_or(filter.field());
        if let Some(predicate) = self.field_predicate(query, field, target, operator, &leaf.value)? {
            query.where_clause(boolean, predicate);
        }
        Ok(())
    }

    /// Predicate for `operator` on `field`, which may be relation-qualified.
    ///
    /// Root columns compare directly. With joins, a joined to-one path reads
    /// the joined alias; any other relation path becomes nested `EXISTS`.
    pub fn field_predicate(
        &self,
        query: &Query,
        field: &str,
        filter: &Filter,
        operator: Operator,
        value: &Value,
    ) -> Result<Option<Predicate>, CompileError> {
        if let Some((date, time)) = filter.date_time_columns() {
            let column = query.date_time_column(date, time);
            return self.apply_operator(column, Some(ColumnType::DateTime), filter, operator, value, field);
        }

        let path = self.registry.split_path(query.entity(), field);
        if !path.is_related() {
            let column_type = query.entity().column_type(&path.column);
            return self.apply_operator(query.column(&path.column), column_type, filter, operator, value, field);
        }

        if query.depth() == 0 {
            if let Some(target) = self.joins.as_ref().and_then(|joins| joins.get(&path.relation_path())) {
                let related = self.registry.walk(query.entity(), &path.relations)?;
                let column = Column::field(&target.alias, &path.column);
                return self.apply_operator(column, related.column_type(&path.column), filter, operator, value, field);
            }
        }

        self.exists_predicate(query, &path.relations, &path.column, filter, operator, value, field)
    }

    #[allow(clippy::too_many_arguments)]
    fn exists_predicate(
        &self,
        query: &Query,
        relations: &[String],
        column: &str,
        filter: &Filter,
        operator: Operator,
        value: &Value,
        field: &str,
    ) -> Result<Option<Predicate>, CompileError> {
        let Some((first, rest)) = relations.split_first() else {
            let column_type = query.entity().column_type(column);
            return self.apply_operator(query.column(column), column_type, filter, operator, value, field);
        };

        let (link, mut related) = query.relation_query(self.registry, first)?;
        let inner = self.exists_predicate(&related, rest, column, filter, operator, value, field)?;
        Ok(inner.map(|predicate| {
            related.where_clause(Boolean::And, predicate);
            Predicate::Exists {
                link,
                query: Box::new(related),
                negated: false,
            }
        }))
    }

    /// Run the operator handler for a column.
    pub fn apply_operator(
        &self,
        column: Column,
        column_type: Option<ColumnType>,
        filter: &Filter,
        operator: Operator,
        value: &Value,
        field: &str,
    ) -> Result<Option<Predicate>, CompileError> {
        build_predicate(&Operation {
            column,
            column_type: column_type.unwrap_or_else(|| column_type_for(filter.filter_type())),
            operator,
            value,
            field,
            context: self.context,
        })
    }

    fn compile_count(
        &self,
        query: &mut Query,
        filter: &Filter,
        relation: &str,
        operator: Operator,
        value: &Value,
        boolean: Boolean,
    ) -> Result<(), CompileError> {
        let compare = compare_op(operator).ok_or_else(|| CompileError::OperatorNotAllowed {
            field: filter.id().to_string(),
            operator: operator.to_string(),
        })?;
        let count = match QueryValue::from_json(value, ColumnType::Integer) {
            Some(QueryValue::Integer(count)) => count,
            _ => {
                return Err(CompileError::invalid_value(
                    filter.id(),
                    operator.as_str(),
                    format!("{value} is not a count"),
                ));
            }
        };
        let (link, related) = query.relation_query(self.registry, relation)?;
        query.where_count(boolean, link, related, compare, count);
        Ok(())
    }

    fn compile_tags(
        &self,
        query: &mut Query,
        filter: &Filter,
        operator: Operator,
        value: &Value,
        boolean: Boolean,
    ) -> Result<(), CompileError> {
        let relation = filter
            .relation()
            .ok_or_else(|| CompileError::descriptor(filter.id(), "a tags filter requires a relation"))?;
        let (link, mut related) = query.relation_query(self.registry, relation)?;

        let negated = match operator {
            Operator::IsNull => true,
            Operator::IsNotNull => false,
            Operator::In | Operator::NotIn => {
                let key = related.entity().primary_key.clone();
                let Some(predicate) = self.apply_operator(
                    related.column(&key),
                    related.entity().column_type(&key),
                    filter,
                    Operator::In,
                    value,
                    filter.id(),
                )?
                else {
                    return Ok(());
                };
                related.where_clause(Boolean::And, predicate);
                operator == Operator::NotIn
            }
            other => {
                return Err(CompileError::OperatorNotAllowed {
                    field: filter.id().to_string(),
                    operator: other.to_string(),
                });
            }
        };
        query.where_has(boolean, link, related, negated);
        Ok(())
    }
}

impl RuleParser for Parser<'_> {
    fn parse(&self, tree: &RuleTree, query: &mut Query) -> Result<(), CompileError> {
        self.compile_group(tree.root(), query)
    }
}
