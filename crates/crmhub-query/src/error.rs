//! Compiler error type.
//!
//! Every failure the compiler can raise is a `CompileError`, converted into
//! `AppError` at the crate boundary. Whether a given error is fatal depends
//! on the [`ValidationMode`](crate::context::ValidationMode) of the compile.

use crmhub_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Errors produced while building descriptors or compiling rule trees.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    // --- Rule tree errors ---
    /// The rule payload is not a usable tree.
    #[error("Malformed rule tree: {reason}")]
    MalformedTree {
        /// What was wrong with the payload.
        reason: String,
    },

    /// A leaf references a field with no filter descriptor.
    #[error("Unknown filter '{field}'")]
    UnknownFilter {
        /// The field reference of the leaf.
        field: String,
    },

    /// A leaf uses an operator the filter does not support.
    #[error("Operator '{operator}' is not allowed for filter '{field}'")]
    OperatorNotAllowed {
        /// Filter identifier.
        field: String,
        /// The operator token as submitted.
        operator: String,
    },

    /// A leaf on an operand filter names no (or an unknown) operand.
    #[error("Filter '{field}' requires a valid operand, got {operand:?}")]
    InvalidOperand {
        /// Filter identifier.
        field: String,
        /// The operand as submitted.
        operand: Option<String>,
    },

    /// The value cannot be used with the operator/field type.
    #[error("Invalid value for '{field}' with operator '{operator}': {reason}")]
    InvalidValue {
        /// Filter identifier or column.
        field: String,
        /// Operator token.
        operator: String,
        /// Why the value was rejected.
        reason: String,
    },

    // --- Schema errors ---
    /// A relation name does not exist on the entity.
    #[error("Entity '{entity}' has no relation '{relation}'")]
    UnknownRelation {
        /// Entity searched.
        entity: String,
        /// Relation requested.
        relation: String,
    },

    /// An entity name is not registered.
    #[error("Unknown entity '{entity}'")]
    UnknownEntity {
        /// The entity name.
        entity: String,
    },

    /// A column does not exist on the entity.
    #[error("Entity '{entity}' has no column '{column}'")]
    UnknownColumn {
        /// Entity searched.
        entity: String,
        /// Column requested.
        column: String,
    },

    /// The relation cannot be expressed as a join without multiplying rows.
    #[error("Relation '{relation}' is not a to-one relation and cannot be joined")]
    RelationNotJoinable {
        /// Relation path.
        relation: String,
    },

    // --- Descriptor errors ---
    /// A filter descriptor was configured inconsistently.
    #[error("Invalid filter descriptor '{field}': {reason}")]
    Descriptor {
        /// Filter identifier.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl CompileError {
    /// Shorthand for a descriptor misconfiguration.
    pub fn descriptor(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Descriptor {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a rejected value.
    pub fn invalid_value(
        field: impl Into<String>,
        operator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a malformed tree.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTree {
            reason: reason.into(),
        }
    }
}

impl From<CompileError> for AppError {
    fn from(err: CompileError) -> Self {
        let kind = match &err {
            CompileError::UnknownEntity { .. } => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_validation_error() {
        let err: AppError = CompileError::UnknownFilter {
            field: "nope".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.status_code(), 422);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn test_unknown_entity_is_internal() {
        let err: AppError = CompileError::UnknownEntity {
            entity: "ghost".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
