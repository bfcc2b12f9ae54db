use provis_driver::DriverError;
use provis_session::StoreError;
use thiserror::Error;

/// Errors surfaced by the provisioning flows.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Required element missing during {stage}: {locator}")]
    MissingElement {
        stage: &'static str,
        locator: String,
    },

    #[error("Capacity recovery failed: {0}")]
    RecoveryExhausted(String),

    #[error("Browser error: {0}")]
    Driver(#[from] DriverError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
