//! The filters available on one listing.

use std::collections::HashMap;

use crate::error::CompileError;
use crate::schema::{ColumnType, EntitySchema};

use super::describe::FilterDescription;
use super::descriptor::{Filter, FilterOption};

/// Validated, ordered collection of filters indexed by id.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
    index: HashMap<String, usize>,
}

impl FilterSet {
    /// Validate every filter and reject duplicate ids.
    pub fn new(filters: impl IntoIterator<Item = Filter>) -> Result<Self, CompileError> {
        let mut set = Self::default();
        for filter in filters {
            filter.validate()?;
            if set.index.contains_key(filter.id()) {
                return Err(CompileError::descriptor(filter.id(), "duplicate filter id"));
            }
            set.index.insert(filter.id().to_string(), set.filters.len());
            set.filters.push(filter);
        }
        Ok(set)
    }

    /// Default filters derived from column types, plus a count filter per
    /// to-many relation.
    pub fn from_schema(entity: &EntitySchema) -> Result<Self, CompileError> {
        let mut filters = Vec::new();
        for (name, column_type) in &entity.columns {
            let label = humanize(name);
            let filter = match column_type {
                ColumnType::Integer | ColumnType::Decimal => Filter::number(name, label),
                ColumnType::Text => Filter::text(name, label),
                ColumnType::Boolean => Filter::select(
                    name,
                    label,
                    vec![FilterOption::new(true, "Yes"), FilterOption::new(false, "No")],
                ),
                ColumnType::Date => Filter::date(name, label),
                ColumnType::DateTime => Filter::date_time(name, label),
                ColumnType::Time | ColumnType::Json => continue,
            };
            filters.push(filter);
        }

        for (name, relation) in &entity.relations {
            if relation.is_to_one() {
                continue;
            }
            let id = format!("{name}_count");
            if entity.has_column(&id) {
                continue;
            }
            let label = format!("{} count", humanize(name));
            filters.push(Filter::number(id, label).countable_relation(name)?);
        }

        Self::new(filters)
    }

    /// Find a filter by id.
    pub fn get(&self, id: &str) -> Option<&Filter> {
        self.index.get(id).map(|position| &self.filters[*position])
    }

    /// All filters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Filters the current user may see.
    pub fn visible(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter().filter(|filter| filter.is_authorized())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// UI descriptions of the visible filters.
    pub fn describe(&self) -> Vec<FilterDescription> {
        self.visible().map(FilterDescription::from).collect()
    }
}

fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
