use tandem_core::SyncError;

/// Errors raised by the yrs binding, the wire envelope and configuration
/// loading. Container-level failures pass through as [`SyncError`].
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Update or state-vector bytes could not be decoded.
    #[error("failed to decode yrs payload: {0}")]
    Decode(#[from] yrs::encoding::read::Error),

    /// A decoded update was rejected by the document.
    #[error("failed to apply update: {0}")]
    Apply(String),

    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode message: {0}")]
    Message(#[from] bincode::error::DecodeError),
}

pub type Result<T, E = CollabError> = std::result::Result<T, E>;
