//! Error taxonomy for the transform pipeline
//!
//! Every component returns `RefactorError`; only the service front door turns
//! one into a user-visible message.

use crate::transform::BackendKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefactorError {
    /// Missing or malformed credential. Fatal for that backend, never retried.
    #[error("{0}")]
    Configuration(String),

    /// Network or remote failure. The user has to reissue the request.
    #[error("{backend} request failed: {cause}")]
    Backend { backend: BackendKind, cause: String },

    #[error("{backend} does not support {operation}")]
    CapabilityUnsupported {
        backend: BackendKind,
        operation: &'static str,
    },

    /// The document changed between proposal and commit.
    #[error("document changed while the change was pending: {0}")]
    EditConflict(#[from] EditConflict),

    #[error("Please select code to refactor")]
    EmptySelection,

    #[error("No active editor found")]
    NoActiveDocument,

    /// A preview is still waiting for accept/reject.
    #[error("A proposed change is still waiting for a decision")]
    PreviewPending,
}

impl RefactorError {
    pub fn backend(backend: BackendKind, cause: impl std::fmt::Display) -> Self {
        RefactorError::Backend {
            backend,
            cause: cause.to_string(),
        }
    }

    /// Short machine-friendly label, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RefactorError::Configuration(_) => "configuration",
            RefactorError::Backend { .. } => "backend",
            RefactorError::CapabilityUnsupported { .. } => "capability_unsupported",
            RefactorError::EditConflict(_) => "edit_conflict",
            RefactorError::EmptySelection => "empty_selection",
            RefactorError::NoActiveDocument => "no_active_document",
            RefactorError::PreviewPending => "preview_pending",
        }
    }
}

/// Returned by a document surface when an edit cannot be applied because the
/// target range no longer holds what the caller expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EditConflict(pub String);

pub type Result<T> = std::result::Result<T, RefactorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_names_backend() {
        let err = RefactorError::backend(BackendKind::Claude, "connection reset");
        assert_eq!(err.to_string(), "claude request failed: connection reset");
        assert_eq!(err.kind(), "backend");
    }

    #[test]
    fn test_edit_conflict_converts() {
        let err: RefactorError = EditConflict("range out of bounds".into()).into();
        assert!(matches!(err, RefactorError::EditConflict(_)));
        assert!(err.to_string().contains("range out of bounds"));
    }
}
