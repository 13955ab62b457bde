//! Errors for spec tree operations.

use thiserror::Error;

/// Errors raised while walking, editing or converting a spec tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// A path segment does not exist in the tree.
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    /// A segment expects a container but the node holds something else.
    #[error("type mismatch at {path}: cannot descend into {found}")]
    TypeMismatch { path: String, found: &'static str },

    /// An add was requested for a field that is already present.
    #[error("field already exists: {path}")]
    FieldExists { path: String },

    /// The dotted path itself is malformed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A `_target_` entry is not a usable target identifier.
    #[error("invalid target at {path}: {reason}")]
    InvalidTarget { path: String, reason: String },
}

impl SpecError {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        SpecError::PathNotFound { path: path.into() }
    }

    pub(crate) fn mismatch(path: impl Into<String>, found: &'static str) -> Self {
        SpecError::TypeMismatch {
            path: path.into(),
            found,
        }
    }
}
