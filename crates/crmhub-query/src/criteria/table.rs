use std::sync::Arc;

use crmhub_core::result::AppResult;
use crmhub_core::types::SortField;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builder::{Column, OrderTarget, Query};
use crate::error::CompileError;
use crate::schema::SchemaRegistry;

use super::Criteria;
use super::request::order_by_field;

/// A column of a resource table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Attribute the column displays; the key requests sort by.
    pub attribute: String,
    #[serde(default = "default_sortable")]
    pub sortable: bool,
    /// Dotted to-one relation path the value is read through.
    #[serde(default)]
    pub relation: Option<String>,
    /// Column on the related entity, defaults to the attribute.
    #[serde(default)]
    pub relation_field: Option<String>,
    /// Displays the number of related rows of `relation`.
    #[serde(default)]
    pub counts: bool,
}

impl TableColumn {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            sortable: true,
            relation: None,
            relation_field: None,
            counts: false,
        }
    }

    /// A column showing `field` of a related record.
    pub fn related(attribute: impl Into<String>, relation: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            relation: Some(relation.into()),
            relation_field: Some(field.into()),
            ..Self::new(attribute)
        }
    }

    /// A column showing `{relation}_count`.
    pub fn count(relation: impl Into<String>) -> Self {
        let relation = relation.into();
        Self {
            counts: true,
            relation: Some(relation.clone()),
            ..Self::new(format!("{relation}_count"))
        }
    }

    pub fn not_sortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    fn count_relation(&self) -> &str {
        self.relation.as_deref().unwrap_or(&self.attribute)
    }
}

fn default_sortable() -> bool {
    true
}

/// Orders a table listing by its column definitions.
///
/// Requested sorts on unknown or non-sortable columns are ignored; when
/// none applies the table's default order is used.
pub struct TableCriteria<'a> {
    columns: &'a [TableColumn],
    order: Vec<SortField>,
    default_order: Vec<SortField>,
    registry: &'a SchemaRegistry,
}

impl<'a> TableCriteria<'a> {
    pub fn new(columns: &'a [TableColumn], order: Vec<SortField>, registry: &'a SchemaRegistry) -> Self {
        Self {
            columns,
            order,
            default_order: Vec::new(),
            registry,
        }
    }

    /// Order used when no requested sort applies. Falls back to the
    /// entity's default order when empty.
    pub fn default_order(mut self, order: Vec<SortField>) -> Self {
        self.default_order = order;
        self
    }

    fn target(&self, query: &mut Query, column: &TableColumn) -> Result<Option<OrderTarget>, CompileError> {
        if column.counts {
            let alias = query.with_count(self.registry, column.count_relation())?;
            return Ok(Some(OrderTarget::Alias(alias)));
        }

        if let Some(relation) = &column.relation {
            let entity = Arc::clone(query.entity());
            let relations: Vec<String> = relation.split('.').map(str::to_string).collect();
            if !self.registry.is_to_one_path(&entity, &relations) {
                debug!(column = %column.attribute, relation = %relation, "Ignoring sort through to-many relation");
                return Ok(None);
            }
            let alias = query.join_relation_path(self.registry, &relations)?;
            let field = column.relation_field.as_deref().unwrap_or(&column.attribute);
            return Ok(Some(OrderTarget::Column(Column::field(alias, field))));
        }

        if query.entity().has_column(&column.attribute) {
            return Ok(Some(OrderTarget::Column(query.column(&column.attribute))));
        }
        Ok(None)
    }
}

impl Criteria for TableCriteria<'_> {
    fn apply(&self, query: &mut Query) -> AppResult<()> {
        for column in self.columns.iter().filter(|column| column.counts) {
            query.with_count(self.registry, column.count_relation())?;
        }

        let mut targets = Vec::new();
        for sort in &self.order {
            let Some(column) = self
                .columns
                .iter()
                .find(|column| column.attribute == sort.field && column.sortable)
            else {
                debug!(field = %sort.field, "Ignoring sort on unsortable column");
                continue;
            };
            if let Some(target) = self.target(query, column)? {
                targets.push((target, sort.direction));
            }
        }

        if !targets.is_empty() {
            query.forget_orders();
            for (target, direction) in targets {
                query.order_by(target, direction);
            }
            return Ok(());
        }

        if query.orders().is_empty() {
            let fallback = if self.default_order.is_empty() {
                query.entity().default_order.clone()
            } else {
                self.default_order.clone()
            };
            for sort in &fallback {
                order_by_field(query, self.registry, sort)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crmhub_core::types::SortDirection;
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::schema::{ColumnType, EntitySchema, Relation};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([
            EntitySchema::new("contacts", "contacts")
                .column("first_name", ColumnType::Text)
                .column("email", ColumnType::Text)
                .column("company_id", ColumnType::Integer)
                .relation("company", Relation::belongs_to("companies", "company_id"))
                .relation("notes", Relation::has_many("notes", "contact_id"))
                .default_order(SortField::desc("id")),
            EntitySchema::new("companies", "companies").column("name", ColumnType::Text),
            EntitySchema::new("notes", "notes").column("contact_id", ColumnType::Integer),
        ])
        .unwrap()
    }

    fn database(registry: &SchemaRegistry) -> MemoryDatabase {
        MemoryDatabase::from_json(
            registry,
            &json!({
                "contacts": [
                    {"id": 1, "first_name": "Cid", "email": "a@x.test", "company_id": 11},
                    {"id": 2, "first_name": "Ann", "email": "c@x.test", "company_id": 10},
                    {"id": 3, "first_name": "Bob", "email": "b@x.test", "company_id": 12}
                ],
                "companies": [{"id": 10, "name": "Beta"}, {"id": 11, "name": "Alpha"}, {"id": 12, "name": "Gamma"}],
                "notes": [
                    {"id": 1, "contact_id": 3}, {"id": 2, "contact_id": 3}, {"id": 3, "contact_id": 2}
                ]
            }),
        )
        .unwrap()
    }

    fn columns() -> Vec<TableColumn> {
        vec![
            TableColumn::new("first_name"),
            TableColumn::new("email").not_sortable(),
            TableColumn::related("company", "company", "name"),
            TableColumn::count("notes"),
        ]
    }

    fn ordered(order: Vec<SortField>) -> (Query, Vec<i64>) {
        let registry = registry();
        let columns = columns();
        let mut query = Query::new(registry.get("contacts").unwrap());
        TableCriteria::new(&columns, order, &registry).apply(&mut query).unwrap();
        let ids = database(&registry).ids(&query);
        (query, ids)
    }

    #[test]
    fn test_orders_by_root_column() {
        assert_eq!(ordered(vec![SortField::asc("first_name")]).1, vec![2, 3, 1]);
    }

    #[test]
    fn test_orders_by_related_column_through_join() {
        let (query, ids) = ordered(vec![SortField::asc("company")]);
        assert_eq!(query.joins().len(), 1);
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_orders_by_relation_count() {
        let (query, ids) = ordered(vec![SortField::desc("notes_count")]);
        assert_eq!(query.aggregates().len(), 1);
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_unsortable_and_unknown_columns_fall_back_to_default() {
        let (query, ids) = ordered(vec![SortField::asc("email"), SortField::asc("nope")]);
        assert_eq!(query.orders().len(), 1);
        assert_eq!(query.orders()[0].direction, SortDirection::Desc);
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_table_default_order_wins_over_entity_default() {
        let registry = registry();
        let columns = columns();
        let mut query = Query::new(registry.get("contacts").unwrap());
        TableCriteria::new(&columns, Vec::new(), &registry)
            .default_order(vec![SortField::asc("email")])
            .apply(&mut query)
            .unwrap();
        assert_eq!(database(&registry).ids(&query), vec![1, 3, 2]);
    }
}
