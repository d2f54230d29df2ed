//! Error types for the mirror database and batch job.

use doorman_store::StoreError;
use thiserror::Error;

/// Result alias for mirror operations.
pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

/// Errors surfaced by the SQLite mirror layer.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Connection, schema or query execution failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Reading or archiving a session file failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Batch schedule outside the valid range.
    #[error("Invalid batch schedule: {0}")]
    Schedule(String),

    /// Mirror configuration could not be applied.
    #[error("Mirror configuration error: {0}")]
    Configuration(String),
}
