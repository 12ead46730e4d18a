use tracing::debug;

use crate::builder::Query;
use crate::context::CompileContext;
use crate::error::CompileError;
use crate::filters::{FilterSet, FilterType};
use crate::rules::{RuleLeaf, RuleTree};
use crate::schema::{EntitySchema, FieldPath, SchemaRegistry};

use super::{JoinMap, JoinTarget, Parser, RuleParser};

/// Parser resolving to-one relation fields through joins.
///
/// The joins of every relation path the tree references are computed once
/// up front and added to the outer query by [`RuleParser::prepare`]; leaves
/// then read the joined aliases. Paths through a to-many relation still
/// compile to `EXISTS`.
#[derive(Debug, Clone)]
pub struct JoinRelationParser<'a> {
    parser: Parser<'a>,
}

impl<'a> JoinRelationParser<'a> {
    pub fn new(
        filters: &'a FilterSet,
        registry: &'a SchemaRegistry,
        context: &'a CompileContext,
        entity: &EntitySchema,
        tree: &RuleTree,
    ) -> Self {
        let joins = join_map(filters, registry, entity, tree);
        debug!(entity = %entity.name, joins = joins.len(), "Compiling rules with joins");
        Self {
            parser: Parser::new(filters, registry, context).with_joins(joins),
        }
    }

    /// The precomputed joins.
    pub fn joins(&self) -> &JoinMap {
        static EMPTY: JoinMap = JoinMap::new();
        self.parser.joins().unwrap_or(&EMPTY)
    }

    /// The underlying parser.
    pub fn parser(&self) -> &Parser<'a> {
        &self.parser
    }
}

impl RuleParser for JoinRelationParser<'_> {
    fn prepare(&self, query: &mut Query) -> Result<(), CompileError> {
        for target in self.joins().values() {
            let alias = query.join_relation_path(self.parser.registry(), &target.relations)?;
            debug_assert_eq!(alias, target.alias);
        }
        Ok(())
    }

    fn parse(&self, tree: &RuleTree, query: &mut Query) -> Result<(), CompileError> {
        self.parser.parse(tree, query)
    }
}

/// Relation path of the field a leaf compiles against on the root entity.
pub(crate) fn leaf_path(
    filters: &FilterSet,
    registry: &SchemaRegistry,
    entity: &EntitySchema,
    leaf: &RuleLeaf,
) -> Option<FieldPath> {
    let filter = filters.get(&leaf.rule)?;
    if filter.custom_predicate().is_some()
        || filter.countable().is_some()
        || matches!(filter.filter_type(), FilterType::HasMany | FilterType::Tags)
    {
        return None;
    }
    let field = if filter.filter_type().uses_operands() {
        filter.find_operand(leaf.operand.as_deref()?)?.value()
    } else {
        filter.field()
    };
    let path = registry.split_path(entity, field);
    path.is_related().then_some(path)
}

fn join_map(
    filters: &FilterSet,
    registry: &SchemaRegistry,
    entity: &EntitySchema,
    tree: &RuleTree,
) -> JoinMap {
    tree.leaves()
        .into_iter()
        .filter_map(|leaf| leaf_path(filters, registry, entity, leaf))
        .filter(|path| registry.is_to_one_path(entity, &path.relations))
        .map(|path| {
            let target = JoinTarget {
                alias: path.relations.join("_"),
                relations: path.relations.clone(),
            };
            (path.relation_path(), target)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::builder::{Column, Predicate};
    use crate::filters::Filter;
    use crate::schema::{ColumnType, Relation};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([
            EntitySchema::new("deals", "deals")
                .column("name", ColumnType::Text)
                .column("company_id", ColumnType::Integer)
                .relation("company", Relation::belongs_to("companies", "company_id"))
                .relation("activities", Relation::has_many("activities", "deal_id")),
            EntitySchema::new("companies", "companies")
                .column("name", ColumnType::Text)
                .column("owner_id", ColumnType::Integer)
                .relation("owner", Relation::belongs_to("users", "owner_id")),
            EntitySchema::new("users", "users").column("name", ColumnType::Text),
            EntitySchema::new("activities", "activities")
                .column("deal_id", ColumnType::Integer)
                .column("kind", ColumnType::Text),
        ])
        .unwrap()
    }

    #[test]
    fn test_precomputes_to_one_paths_only() {
        let registry = registry();
        let filters = FilterSet::new([
            Filter::text("company.owner.name", "Owner"),
            Filter::text("company.name", "Company"),
            Filter::text("activities.kind", "Activity"),
            Filter::text("name", "Name"),
        ])
        .unwrap();
        let tree = RuleTree::parse(&json!([
            {"type": "rule", "query": {"rule": "company.owner.name", "operator": "equal", "value": "Ann"}},
            {"type": "rule", "query": {"rule": "company.name", "operator": "equal", "value": "Acme"}},
            {"type": "rule", "query": {"rule": "activities.kind", "operator": "equal", "value": "call"}},
            {"type": "rule", "query": {"rule": "name", "operator": "equal", "value": "x"}}
        ]))
        .unwrap();
        let context = CompileContext::utc(Utc::now());
        let deals = registry.get("deals").unwrap();
        let parser = JoinRelationParser::new(&filters, &registry, &context, &deals, &tree);

        let aliases: Vec<&str> = parser.joins().values().map(|t| t.alias.as_str()).collect();
        assert_eq!(aliases, vec!["company", "company_owner"]);

        let mut query = Query::new(deals);
        parser.prepare(&mut query).unwrap();
        parser.parse(&tree, &mut query).unwrap();

        assert_eq!(query.joins().len(), 2);
        assert_eq!(query.wheres().len(), 4);
        assert!(matches!(
            &query.wheres()[0].predicate,
            Predicate::Compare { column, .. } if *column == Column::field("company_owner", "name")
        ));
        assert!(matches!(&query.wheres()[2].predicate, Predicate::Exists { .. }));
    }
}
