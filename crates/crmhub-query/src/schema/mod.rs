//! Entity schemas: the columns, relations and global scopes of each
//! listable record type.
//!
//! Schemas are plain data and can be deserialized from JSON/TOML, or built
//! in code with the chaining helpers on [`EntitySchema`].

pub mod registry;
pub mod relation;

use std::collections::BTreeMap;

use crmhub_core::types::SortField;
use serde::{Deserialize, Serialize};

pub use registry::{FieldPath, SchemaRegistry};
pub use relation::{LinkKind, MorphConstraint, Relation, RelationKind, RelationLink};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Integer column (also used for keys).
    Integer,
    /// Decimal / floating point column.
    Decimal,
    /// Text column.
    Text,
    /// Boolean column.
    Boolean,
    /// Date column.
    Date,
    /// Timestamp column, stored as UTC.
    #[serde(alias = "datetime")]
    DateTime,
    /// Time-of-day column.
    Time,
    /// JSON column.
    Json,
}

impl ColumnType {
    /// Whether the column holds a calendar date or instant.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }
}

/// A named constraint applied to every query on an entity unless removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalScope {
    /// Name used to remove the scope.
    pub name: String,
    /// The constraint the scope applies.
    #[serde(flatten)]
    pub constraint: ScopeConstraint,
}

/// What a global scope constrains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScopeConstraint {
    /// Excludes rows whose `column` is not null.
    SoftDeletes {
        /// Deletion timestamp column.
        column: String,
    },
    /// Restricts `column` to a fixed value.
    Equals {
        /// Constrained column.
        column: String,
        /// Required value.
        value: serde_json::Value,
    },
}

impl GlobalScope {
    /// Standard soft-delete scope named `soft_deletes`.
    pub fn soft_deletes(column: impl Into<String>) -> Self {
        Self {
            name: "soft_deletes".to_string(),
            constraint: ScopeConstraint::SoftDeletes {
                column: column.into(),
            },
        }
    }

    /// Scope restricting a column to a constant.
    pub fn equals(
        name: impl Into<String>,
        column: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            constraint: ScopeConstraint::Equals {
                column: column.into(),
                value,
            },
        }
    }
}

/// Default operator used for a searchable column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchOperator {
    /// Exact match.
    #[default]
    #[serde(rename = "=")]
    Equal,
    /// Substring match (`%term%`).
    #[serde(rename = "like")]
    Like,
    /// Membership in a comma separated list.
    #[serde(rename = "in")]
    In,
}

impl SearchOperator {
    /// Parse the operator part of a `field:operator` search field.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "=" | "equal" => Some(Self::Equal),
            "like" => Some(Self::Like),
            "in" => Some(Self::In),
            _ => None,
        }
    }
}

/// A column (or `relation.column`) included in free-text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableColumn {
    /// Column or relation-qualified column.
    pub field: String,
    /// Operator used when the request does not override it.
    #[serde(default)]
    pub operator: SearchOperator,
}

/// A listable record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity name, used to reference it from relations.
    pub name: String,
    /// Backing table.
    pub table: String,
    /// Primary key column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Column types by name.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnType>,
    /// Relations by name.
    #[serde(default)]
    pub relations: BTreeMap<String, Relation>,
    /// Global scopes applied to every query on the entity.
    #[serde(default)]
    pub scopes: Vec<GlobalScope>,
    /// Columns scanned by free-text search, in order.
    #[serde(default)]
    pub searchable: Vec<SearchableColumn>,
    /// Order applied when a listing requests none.
    #[serde(default)]
    pub default_order: Vec<SortField>,
}

impl EntitySchema {
    /// Start a schema with an integer `id` primary key.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(default_primary_key(), ColumnType::Integer);
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            columns,
            relations: BTreeMap::new(),
            scopes: Vec::new(),
            searchable: Vec::new(),
            default_order: Vec::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.insert(name.into(), column_type);
        self
    }

    /// Add a relation.
    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Add a global scope.
    pub fn scope(mut self, scope: GlobalScope) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Append a searchable column.
    pub fn searchable(mut self, field: impl Into<String>, operator: SearchOperator) -> Self {
        self.searchable.push(SearchableColumn {
            field: field.into(),
            operator,
        });
        self
    }

    /// Append to the default order.
    pub fn default_order(mut self, sort: SortField) -> Self {
        self.default_order.push(sort);
        self
    }

    /// Type of a column, if it exists.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    /// Whether the entity has the column.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Look up a relation by name.
    pub fn relation_named(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Whether `column` is an integer key: the primary key, or an integer
    /// column named like a foreign key (`*_id`, `*_by`) that a belongs-to
    /// relation uses.
    pub fn is_key_column(&self, column: &str) -> bool {
        if self.column_type(column) != Some(ColumnType::Integer) {
            return false;
        }
        if column == self.primary_key {
            return true;
        }
        let foreign_key = self.relations.values().any(|relation| {
            matches!(&relation.kind, RelationKind::BelongsTo { foreign_key, .. } if foreign_key == column)
        });
        foreign_key && (column.ends_with("_id") || column.ends_with("_by"))
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}
