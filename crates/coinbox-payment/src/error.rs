use crate::session::SessionState;
use coinbox_core::{ErrorKind, SessionId};
use coinbox_storage::StorageError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] coinbox_core::Error),

    #[error("Coin value {value} is not an accepted denomination ({accepted})")]
    InvalidDenomination { value: Decimal, accepted: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No payment session {0}")]
    SessionNotFound(SessionId),

    #[error("No payment session is bound to this device")]
    NoActiveSession,

    #[error("Payment session {0} already exists")]
    SessionExists(SessionId),

    #[error("Payment session {session_id} cannot {action} while {state}")]
    InvalidTransition {
        session_id: SessionId,
        state: SessionState,
        action: &'static str,
    },

    #[error("Payment incomplete: paid {paid}, required {required}")]
    PaymentIncomplete { paid: Decimal, required: Decimal },

    #[error("Print submission failed: {0}")]
    PrintSubmission(String),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(e) => e.kind(),
            Self::Core(e) => e.kind(),
            Self::InvalidDenomination { .. } | Self::InvalidAmount(_) => ErrorKind::InvalidInput,
            Self::SessionNotFound(_) => ErrorKind::NotFound,
            Self::NoActiveSession
            | Self::SessionExists(_)
            | Self::InvalidTransition { .. }
            | Self::PaymentIncomplete { .. } => ErrorKind::InvalidState,
            Self::PrintSubmission(_) => ErrorKind::PrintSubmission,
        }
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;
