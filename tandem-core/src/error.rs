use crate::backend::HandleKind;

/// Errors raised by synchronized containers and backend handles.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A registered converter rejected a value.
    #[error("converter for key '{key}' failed: {reason}")]
    Converter { key: String, reason: String },

    /// A value did not have the shape the caller asked for.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Positional access outside of a vector or string.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A backend handle was asked to do something it cannot do.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend value of one kind was found where another was required.
    #[error("backend handle is a {found}, expected a {expected}")]
    HandleKind {
        expected: HandleKind,
        found: HandleKind,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Shorthand used by converter implementations.
    pub fn converter(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SyncError::Converter {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
