use coinbox_core::constants::{CMD_COIN, CMD_ERROR, CMD_HEARTBEAT, CMD_STATUS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded message from the coin acceptor.
///
/// The set is closed: every consumer matches exhaustively, so a new device
/// message forces every handler to be revisited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HardwareEvent {
    /// A coin passed the sensor. The amount is in `(0, 100]` but has not
    /// yet been checked against the accepted denominations.
    Coin { amount: Decimal },

    /// Free-form status report (`STATUS:READY`).
    Status { text: String },

    /// Device-side error report (`ERROR:JAM`).
    Error { message: String },

    /// Liveness signal.
    Heartbeat,
}

impl HardwareEvent {
    /// Wire command token of this event.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Coin { .. } => CMD_COIN,
            Self::Status { .. } => CMD_STATUS,
            Self::Error { .. } => CMD_ERROR,
            Self::Heartbeat => CMD_HEARTBEAT,
        }
    }

    pub fn is_coin(&self) -> bool {
        matches!(self, Self::Coin { .. })
    }
}

impl fmt::Display for HardwareEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coin { amount } => write!(f, "{CMD_COIN}:{amount}"),
            Self::Status { text } => write!(f, "{CMD_STATUS}:{text}"),
            Self::Error { message } => write!(f, "{CMD_ERROR}:{message}"),
            Self::Heartbeat => write!(f, "{CMD_HEARTBEAT}"),
        }
    }
}
