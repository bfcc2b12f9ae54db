use thiserror::Error;

/// Errors from writing or clearing persisted sessions.
///
/// Read failures are deliberately not represented here: a session that
/// cannot be read is treated as absent by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
