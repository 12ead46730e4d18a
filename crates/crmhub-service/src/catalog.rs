//! Listable resources and the filters each exposes.

use std::collections::HashMap;
use std::sync::Arc;

use crmhub_core::error::AppError;
use crmhub_core::result::AppResult;
use crmhub_query::criteria::TableColumn;
use crmhub_query::{EntitySchema, FilterSet, SchemaRegistry};

/// A listing: the entity it lists and the filters users can build rules
/// from.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Listing identifier saved filters are stored under (`deals`).
    pub identifier: String,
    /// Entity name in the schema registry.
    pub entity: String,
    pub filters: FilterSet,
    /// Columns of the resource table.
    pub table_columns: Vec<TableColumn>,
    /// Date column exports are bounded and ordered by.
    pub export_column: Option<String>,
}

impl Resource {
    pub fn new(identifier: impl Into<String>, entity: impl Into<String>, filters: FilterSet) -> Self {
        Self {
            identifier: identifier.into(),
            entity: entity.into(),
            filters,
            table_columns: Vec::new(),
            export_column: None,
        }
    }

    /// A resource with the filters derived from the entity's columns.
    pub fn from_schema(identifier: impl Into<String>, entity: &EntitySchema) -> AppResult<Self> {
        Ok(Self::new(identifier, entity.name.clone(), FilterSet::from_schema(entity)?))
    }

    pub fn table_columns(mut self, columns: Vec<TableColumn>) -> Self {
        self.table_columns = columns;
        self
    }

    pub fn export_column(mut self, column: impl Into<String>) -> Self {
        self.export_column = Some(column.into());
        self
    }
}

/// Schema registry plus the resources defined on it.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    registry: SchemaRegistry,
    resources: HashMap<String, Arc<Resource>>,
}

impl ResourceCatalog {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            resources: HashMap::new(),
        }
    }

    /// Register a resource. Its entity must exist and its identifier must
    /// be unused.
    pub fn register(&mut self, resource: Resource) -> AppResult<()> {
        self.registry.get(&resource.entity)?;
        if self.resources.contains_key(&resource.identifier) {
            return Err(AppError::conflict(format!(
                "Resource '{}' is already registered",
                resource.identifier
            )));
        }
        self.resources
            .insert(resource.identifier.clone(), Arc::new(resource));
        Ok(())
    }

    /// A catalog exposing every registered entity under its own name with
    /// schema-derived filters.
    pub fn from_registry(registry: SchemaRegistry) -> AppResult<Self> {
        let mut catalog = Self::new(registry.clone());
        for name in registry.names() {
            let entity = registry.get(name)?;
            catalog.register(Resource::from_schema(name, &entity)?)?;
        }
        Ok(catalog)
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn get(&self, identifier: &str) -> AppResult<Arc<Resource>> {
        self.resources
            .get(identifier)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Unknown resource '{identifier}'")))
    }

    pub fn entity(&self, resource: &Resource) -> AppResult<Arc<EntitySchema>> {
        Ok(self.registry.get(&resource.entity)?)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut identifiers: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        identifiers.sort_unstable();
        identifiers
    }
}

#[cfg(test)]
mod tests {
    use crmhub_core::error::ErrorKind;
    use crmhub_query::schema::ColumnType;

    use super::*;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new([
            EntitySchema::new("deals", "deals").column("name", ColumnType::Text),
            EntitySchema::new("companies", "companies").column("name", ColumnType::Text),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_registry_exposes_every_entity() {
        let catalog = ResourceCatalog::from_registry(registry()).unwrap();
        assert_eq!(catalog.identifiers(), vec!["companies", "deals"]);
        assert!(catalog.get("deals").unwrap().filters.get("name").is_some());
        assert_eq!(catalog.get("leads").unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_register_checks_entity_and_duplicates() {
        let mut catalog = ResourceCatalog::new(registry());
        let missing = Resource::new("leads", "leads", FilterSet::default());
        assert!(catalog.register(missing).is_err());

        catalog
            .register(Resource::new("deals", "deals", FilterSet::default()))
            .unwrap();
        let err = catalog
            .register(Resource::new("deals", "deals", FilterSet::default()))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
