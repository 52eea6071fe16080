use coinbox_core::constants::{
    CMD_COIN, CMD_ERROR, CMD_HEARTBEAT, DELIMITER_PAYLOAD, REPLY_ACK, REPLY_NAK,
};
use rust_decimal::Decimal;
use std::fmt;

/// Messages the kiosk sends back to the coin acceptor.
///
/// # Example
/// ```
/// use coinbox_protocol::{DeviceReply, format_message};
/// use rust_decimal::Decimal;
///
/// let reply = DeviceReply::AckCoin(Decimal::new(500, 2));
/// assert_eq!(format_message(&reply), "ACK:COIN:5.00");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceReply {
    /// The coin was credited or banked.
    AckCoin(Decimal),

    /// The coin was rejected by business rules (e.g. not an accepted
    /// denomination).
    NakCoin(Decimal),

    /// The coin could not be recorded because of a persistence failure.
    CoinProcessingError,

    /// The heartbeat was recorded.
    AckHeartbeat,
}

impl fmt::Display for DeviceReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = DELIMITER_PAYLOAD;
        match self {
            Self::AckCoin(amount) => write!(f, "{REPLY_ACK}{d}{CMD_COIN}{d}{amount}"),
            Self::NakCoin(amount) => write!(f, "{REPLY_NAK}{d}{CMD_COIN}{d}{amount}"),
            Self::CoinProcessingError => write!(f, "{CMD_ERROR}{d}COIN_PROCESSING"),
            Self::AckHeartbeat => write!(f, "{REPLY_ACK}{d}{CMD_HEARTBEAT}"),
        }
    }
}

/// Format a reply for the wire, without the line terminator.
///
/// The channel appends the terminator when it sends.
pub fn format_message(reply: &DeviceReply) -> String {
    reply.to_string()
}
