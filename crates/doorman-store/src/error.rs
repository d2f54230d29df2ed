use thiserror::Error;

/// Store-specific error types for the station's durable files.
///
/// The access log and registry live on plain files so that a yanked power
/// cable never costs more than the line being written; these errors carry
/// the path context an operator needs when that still goes wrong.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The session pointer sidecar could not be decoded
    #[error("Session pointer corrupt: {0}")]
    PointerCorrupt(String),

    /// A CSV row could not be parsed
    #[error("Malformed row at {file}:{line}: {reason}")]
    MalformedRow {
        file: String,
        line: usize,
        reason: String,
    },

    /// Domain-level validation error
    #[error(transparent)]
    Domain(#[from] doorman_core::Error),
}

impl StoreError {
    /// Attach path context to an I/O failure.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Specialized result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_path() {
        let err = StoreError::io(
            "/tmp/data_logs/x.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/data_logs/x.csv"));
    }

    #[test]
    fn test_domain_error_passes_through() {
        let err: StoreError = doorman_core::Error::NoActiveSession.into();
        assert!(matches!(err, StoreError::Domain(_)));
    }
}
