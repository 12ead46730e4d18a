use std::sync::Arc;

use crmhub_core::result::AppResult;
use serde_json::Value;
use tracing::debug;

use crate::builder::{Boolean, Query};
use crate::context::CompileContext;
use crate::filters::FilterSet;
use crate::parser::join::leaf_path;
use crate::parser::{JoinRelationParser, Parser, RuleParser};
use crate::rules::{RuleTree, substitute_special_values};
use crate::schema::{EntitySchema, SchemaRegistry};

use super::Criteria;

/// Applies a rule tree to a listing query.
///
/// The payload is parsed leniently: a missing or malformed tree applies no
/// filter. Trees with relation-qualified fields compile with joins.
pub struct FilterRulesCriteria<'a> {
    rules: Value,
    filters: &'a FilterSet,
    registry: &'a SchemaRegistry,
    context: &'a CompileContext,
}

impl<'a> FilterRulesCriteria<'a> {
    pub fn new(
        rules: Value,
        filters: &'a FilterSet,
        registry: &'a SchemaRegistry,
        context: &'a CompileContext,
    ) -> Self {
        Self {
            rules,
            filters,
            registry,
            context,
        }
    }

    /// Whether any leaf reads a field through a declared relation.
    pub fn needs_joins(&self, entity: &EntitySchema, tree: &RuleTree) -> bool {
        tree.leaves()
            .into_iter()
            .any(|leaf| leaf_path(self.filters, self.registry, entity, leaf).is_some())
    }
}

impl Criteria for FilterRulesCriteria<'_> {
    fn apply(&self, query: &mut Query) -> AppResult<()> {
        let Some(mut tree) = RuleTree::from_value(&self.rules) else {
            return Ok(());
        };
        substitute_special_values(&mut tree, self.filters, self.context);

        let entity = Arc::clone(query.entity());
        let mut nested = query.nested();
        if self.needs_joins(&entity, &tree) {
            let parser = JoinRelationParser::new(self.filters, self.registry, self.context, &entity, &tree);
            parser.prepare(query)?;
            parser.parse(&tree, &mut nested)?;
        } else {
            debug!(entity = %entity.name, "Compiling rules with sub-queries");
            Parser::new(self.filters, self.registry, self.context).parse(&tree, &mut nested)?;
        }

        query.inherit_removed_scopes(&nested);
        query.add_nested(Boolean::And, nested);
        Ok(())
    }
}
