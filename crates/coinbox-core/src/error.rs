use std::fmt;
use thiserror::Error;

/// Failure classes shared by every crate in the workspace.
///
/// Each crate keeps its own error enum; `kind()` on those enums maps a
/// concrete failure onto one of these classes so callers (the listener,
/// the payment status endpoint) can decide whether to retry, report or
/// ignore without matching on crate-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range data at a boundary. Never retried.
    InvalidInput,

    /// Deduction larger than the available balance. No partial effect.
    InsufficientBalance,

    /// Serial channel connect/read/write failure. Transient.
    HardwareUnavailable,

    /// Ledger transaction could not commit. Must reach the caller.
    PersistenceFailure,

    /// Referenced entity (user, session) does not exist.
    NotFound,

    /// Operation not allowed in the current state.
    InvalidState,

    /// Invalid configuration detected at startup.
    Configuration,

    /// The print collaborator rejected or failed a job.
    PrintSubmission,
}

impl ErrorKind {
    /// Whether an automatic retry can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HardwareUnavailable | Self::PersistenceFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::InsufficientBalance => "insufficient_balance",
            Self::HardwareUnavailable => "hardware_unavailable",
            Self::PersistenceFailure => "persistence_failure",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Configuration => "configuration",
            Self::PrintSubmission => "print_submission",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid denomination: {0}")]
    InvalidDenomination(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    // Store errors
    #[error("Stored value for key {key} is not {expected}")]
    StoreTypeMismatch { key: String, expected: &'static str },

    #[error("Store backend error: {0}")]
    StoreBackend(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_) | Self::InvalidDenomination(_) | Self::InvalidIdentifier(_) => {
                ErrorKind::InvalidInput
            }
            Self::Config(_) | Self::MissingConfig(_) => ErrorKind::Configuration,
            Self::StoreTypeMismatch { .. } => ErrorKind::InvalidState,
            Self::StoreBackend(_) => ErrorKind::PersistenceFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
