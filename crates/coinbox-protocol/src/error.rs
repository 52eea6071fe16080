use coinbox_core::ErrorKind;
use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons a line from the coin acceptor is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty message")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command {0} requires a payload")]
    MissingPayload(&'static str),

    #[error("Coin amount is not a number: {0}")]
    InvalidAmount(String),

    #[error("Coin amount {0} outside (0, 100]")]
    AmountOutOfRange(Decimal),
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;
