//! Error types for the access engine.

use doorman_serial::LinkError;
use doorman_store::StoreError;
use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine and session layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Domain rule violation (bad UID, invalid transition, guard failure).
    #[error(transparent)]
    Domain(#[from] doorman_core::Error),

    /// Durable file layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serial link failure.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// No reader device answered the firmware probe on any port.
    #[error("No reader device found on any serial port")]
    NoDeviceFound,

    /// Station configuration could not be loaded or is inconsistent.
    #[error("Invalid station configuration: {0}")]
    Config(String),
}
