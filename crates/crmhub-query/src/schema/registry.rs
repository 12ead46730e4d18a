//! Registry of entity schemas and relation path resolution.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CompileError;

use super::{EntitySchema, Relation};

/// A field reference split into its relation path and column.
///
/// `company.owner.name` on deals becomes relations `["company", "owner"]`
/// and column `name`. A dotted field whose first segment is not a relation
/// stays a literal column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// Relations walked from the root entity.
    pub relations: Vec<String>,
    /// Column on the last related entity.
    pub column: String,
}

impl FieldPath {
    /// Whether the field goes through at least one relation.
    pub fn is_related(&self) -> bool {
        !self.relations.is_empty()
    }

    /// The relation path joined with dots.
    pub fn relation_path(&self) -> String {
        self.relations.join(".")
    }
}

/// All entity schemas known to the compiler.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    /// Build a registry, checking that every relation points at a
    /// registered entity.
    pub fn new(schemas: impl IntoIterator<Item = EntitySchema>) -> Result<Self, CompileError> {
        let entities: HashMap<String, Arc<EntitySchema>> = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), Arc::new(schema)))
            .collect();

        for schema in entities.values() {
            for relation in schema.relations.values() {
                if !entities.contains_key(&relation.related) {
                    return Err(CompileError::UnknownEntity {
                        entity: relation.related.clone(),
                    });
                }
            }
        }

        Ok(Self { entities })
    }

    /// Look up an entity by name.
    pub fn get(&self, name: &str) -> Result<Arc<EntitySchema>, CompileError> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownEntity {
                entity: name.to_string(),
            })
    }

    /// Names of all registered entities, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a relation of `entity` and the schema it points at.
    pub fn related<'s>(
        &self,
        entity: &'s EntitySchema,
        relation: &str,
    ) -> Result<(&'s Relation, Arc<EntitySchema>), CompileError> {
        let found = entity
            .relation_named(relation)
            .ok_or_else(|| CompileError::UnknownRelation {
                entity: entity.name.clone(),
                relation: relation.to_string(),
            })?;
        Ok((found, self.get(&found.related)?))
    }

    /// Split a field reference into relations and the final column.
    pub fn split_path(&self, entity: &EntitySchema, field: &str) -> FieldPath {
        let segments: Vec<&str> = field.split('.').collect();
        let mut relations = Vec::new();
        let mut current: Option<Arc<EntitySchema>> = None;

        for (index, segment) in segments.iter().enumerate() {
            if index + 1 == segments.len() {
                break;
            }
            let schema = current.as_deref().unwrap_or(entity);
            let Some(next) = self.related(schema, segment).ok().map(|(_, next)| next) else {
                break;
            };
            relations.push(segment.to_string());
            current = Some(next);
        }

        let column = segments[relations.len()..].join(".");
        FieldPath { relations, column }
    }

    /// The schema at the end of a relation path.
    pub fn walk(
        &self,
        entity: &Arc<EntitySchema>,
        relations: &[String],
    ) -> Result<Arc<EntitySchema>, CompileError> {
        let mut current = Arc::clone(entity);
        for relation in relations {
            let (_, next) = self.related(&current, relation)?;
            current = next;
        }
        Ok(current)
    }

    /// Whether every relation on the path is to-one.
    pub fn is_to_one_path(&self, entity: &EntitySchema, relations: &[String]) -> bool {
        let mut current: Option<Arc<EntitySchema>> = None;
        for relation in relations {
            let schema = current.as_deref().unwrap_or(entity);
            let step = self
                .related(schema, relation)
                .ok()
                .filter(|(found, _)| found.is_to_one())
                .map(|(_, next)| next);
            match step {
                Some(next) => current = Some(next),
                None => return false,
            }
        }
        true
    }
}
