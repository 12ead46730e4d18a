//! Relations between entities and the key pairs that link them.

use serde::{Deserialize, Serialize};

/// A relation from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Name of the related entity.
    pub related: String,
    /// How the two entities are linked.
    #[serde(flatten)]
    pub kind: RelationKind,
}

/// Relation cardinality and keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// `parent.foreign_key = related.owner_key`.
    BelongsTo {
        /// Column on the parent.
        foreign_key: String,
        /// Column on the related entity.
        #[serde(default = "default_key")]
        owner_key: String,
    },
    /// `parent.local_key = related.foreign_key`, at most one related row.
    HasOne {
        /// Column on the related entity.
        foreign_key: String,
        /// Column on the parent.
        #[serde(default = "default_key")]
        local_key: String,
    },
    /// `parent.local_key = related.foreign_key`.
    HasMany {
        /// Column on the related entity.
        foreign_key: String,
        /// Column on the parent.
        #[serde(default = "default_key")]
        local_key: String,
    },
    /// Linked through a pivot table.
    BelongsToMany {
        /// Pivot table.
        pivot_table: String,
        /// Pivot column referencing the parent.
        foreign_pivot_key: String,
        /// Pivot column referencing the related entity.
        related_pivot_key: String,
        /// Parent column referenced by the pivot.
        #[serde(default = "default_key")]
        parent_key: String,
        /// Related column referenced by the pivot.
        #[serde(default = "default_key")]
        related_key: String,
        /// Extra constraint for polymorphic pivots.
        #[serde(default)]
        morph: Option<MorphConstraint>,
    },
}

/// Fixed type column on a polymorphic pivot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphConstraint {
    /// Pivot column holding the parent type.
    pub column: String,
    /// Value identifying the parent type.
    pub value: String,
}

impl Relation {
    /// Belongs-to relation on `foreign_key`, owner key `id`.
    pub fn belongs_to(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            related: related.into(),
            kind: RelationKind::BelongsTo {
                foreign_key: foreign_key.into(),
                owner_key: default_key(),
            },
        }
    }

    /// Has-one relation; the related entity holds `foreign_key`.
    pub fn has_one(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            related: related.into(),
            kind: RelationKind::HasOne {
                foreign_key: foreign_key.into(),
                local_key: default_key(),
            },
        }
    }

    /// Has-many relation; the related entity holds `foreign_key`.
    pub fn has_many(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            related: related.into(),
            kind: RelationKind::HasMany {
                foreign_key: foreign_key.into(),
                local_key: default_key(),
            },
        }
    }

    /// Many-to-many relation through `pivot_table`.
    pub fn belongs_to_many(
        related: impl Into<String>,
        pivot_table: impl Into<String>,
        foreign_pivot_key: impl Into<String>,
        related_pivot_key: impl Into<String>,
    ) -> Self {
        Self {
            related: related.into(),
            kind: RelationKind::BelongsToMany {
                pivot_table: pivot_table.into(),
                foreign_pivot_key: foreign_pivot_key.into(),
                related_pivot_key: related_pivot_key.into(),
                parent_key: default_key(),
                related_key: default_key(),
                morph: None,
            },
        }
    }

    /// Add a polymorphic type constraint to a many-to-many relation.
    pub fn morph(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        if let RelationKind::BelongsToMany { morph, .. } = &mut self.kind {
            *morph = Some(MorphConstraint {
                column: column.into(),
                value: value.into(),
            });
        }
        self
    }

    /// Whether the relation yields at most one related row, so joining it
    /// cannot multiply parent rows.
    pub fn is_to_one(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::BelongsTo { .. } | RelationKind::HasOne { .. }
        )
    }

    /// Build the link between a parent query qualifier and a related one.
    pub fn link(&self, name: &str, parent: &str, related_table: &str, related: &str) -> RelationLink {
        let kind = match &self.kind {
            RelationKind::BelongsTo {
                foreign_key,
                owner_key,
            } => LinkKind::Direct {
                parent_column: foreign_key.clone(),
                related_column: owner_key.clone(),
            },
            RelationKind::HasOne {
                foreign_key,
                local_key,
            }
            | RelationKind::HasMany {
                foreign_key,
                local_key,
            } => LinkKind::Direct {
                parent_column: local_key.clone(),
                related_column: foreign_key.clone(),
            },
            RelationKind::BelongsToMany {
                pivot_table,
                foreign_pivot_key,
                related_pivot_key,
                parent_key,
                related_key,
                morph,
            } => LinkKind::Pivot {
                table: pivot_table.clone(),
                parent_pivot_column: foreign_pivot_key.clone(),
                related_pivot_column: related_pivot_key.clone(),
                parent_column: parent_key.clone(),
                related_column: related_key.clone(),
                morph: morph.clone(),
            },
        };

        RelationLink {
            name: name.to_string(),
            parent: parent.to_string(),
            related_table: related_table.to_string(),
            related: related.to_string(),
            kind,
        }
    }
}

/// A relation resolved against concrete query qualifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationLink {
    /// Relation name.
    pub name: String,
    /// Qualifier (table or alias) of the parent query.
    pub parent: String,
    /// Table of the related entity.
    pub related_table: String,
    /// Qualifier (table or alias) of the related query.
    pub related: String,
    /// Key columns.
    pub kind: LinkKind,
}

/// Key columns of a [`RelationLink`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkKind {
    /// `parent.parent_column = related.related_column`.
    Direct {
        /// Column on the parent.
        parent_column: String,
        /// Column on the related entity.
        related_column: String,
    },
    /// Through a pivot table.
    Pivot {
        /// Pivot table.
        table: String,
        /// Pivot column matching `parent.parent_column`.
        parent_pivot_column: String,
        /// Pivot column matching `related.related_column`.
        related_pivot_column: String,
        /// Column on the parent.
        parent_column: String,
        /// Column on the related entity.
        related_column: String,
        /// Polymorphic type constraint on the pivot.
        morph: Option<MorphConstraint>,
    },
}

fn default_key() -> String {
    "id".to_string()
}
