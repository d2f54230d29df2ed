//! Error types for the serial transport layer.

use thiserror::Error;

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors raised while talking to the reader hardware.
#[derive(Debug, Error)]
pub enum LinkError {
    // Port lifecycle
    /// The port could not be opened or cloned.
    #[error("Serial port '{port}' unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// A command write failed mid-session.
    #[error("Write to '{port}' failed: {source}")]
    WriteFailed {
        port: String,
        #[source]
        source: std::io::Error,
    },

    // Probe outcomes
    /// The device never answered the ping.
    #[error("No pong from '{port}' within {timeout_ms}ms")]
    ProbeTimeout { port: String, timeout_ms: u64 },

    /// Something answered, but not the firmware we expect.
    #[error("Device on '{port}' identifies as '{got}', expected '{expected}'")]
    ProtocolMismatch {
        port: String,
        expected: String,
        got: String,
    },

    // Environment
    /// Port enumeration failed at the OS level.
    #[error("Port enumeration failed: {0}")]
    Enumeration(#[from] serialport::Error),

    /// Low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Shorthand for [`LinkError::PortUnavailable`].
    pub fn unavailable(port: impl Into<String>, reason: impl ToString) -> Self {
        LinkError::PortUnavailable {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`LinkError::WriteFailed`].
    pub fn write_failed(port: impl Into<String>, source: std::io::Error) -> Self {
        LinkError::WriteFailed {
            port: port.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_port() {
        let err = LinkError::unavailable("/dev/ttyUSB0", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("/dev/ttyUSB0"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_mismatch_message_names_both_tags() {
        let err = LinkError::ProtocolMismatch {
            port: "/dev/ttyACM0".to_string(),
            expected: "doorman-fw".to_string(),
            got: "gps-nmea".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("doorman-fw"));
        assert!(msg.contains("gps-nmea"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: LinkError = io.into();
        assert!(matches!(err, LinkError::Io(_)));
    }
}
