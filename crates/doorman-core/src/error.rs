use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("Invalid uid format: {0}")]
    InvalidUidFormat(String),

    #[error("Invalid command code: {0}")]
    InvalidCommandCode(String),

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Line too long: {len} bytes exceeds maximum of {max}")]
    LineTooLong { len: usize, max: usize },

    // State machine errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("State violation: {0}")]
    StateViolation(String),

    // Enrollment guard rejections
    #[error("Uid already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Uid is the configured admin credential")]
    IsAdminCredential,

    // Session errors
    #[error("No active session")]
    NoActiveSession,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a [`Error::StateViolation`] with a formatted reason.
    pub fn state_violation(reason: impl Into<String>) -> Self {
        Error::StateViolation(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
