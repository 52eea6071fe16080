//! Coin acceptor message parser.
//!
//! Converts raw ASCII lines into [`HardwareEvent`]s.
//!
//! # Protocol Format
//!
//! ```text
//! COMMAND[:PAYLOAD]\n
//! ```
//!
//! The command is split from the payload at the first `:` and matched
//! case-insensitively. The payload is kept verbatim, so `STATUS:A:B` carries
//! the text `A:B`.
//!
//! | Command     | Payload              | Event                    |
//! |-------------|----------------------|--------------------------|
//! | `COIN`      | decimal in (0, 100]  | [`HardwareEvent::Coin`]  |
//! | `STATUS`    | non-empty text       | [`HardwareEvent::Status`]|
//! | `ERROR`     | non-empty text       | [`HardwareEvent::Error`] |
//! | `HEARTBEAT` | ignored              | [`HardwareEvent::Heartbeat`] |
//!
//! Out-of-range coin amounts are rejected rather than clamped: an oversized
//! value is a sensor glitch, not a big coin.
//!
//! # Examples
//!
//! ```
//! use coinbox_protocol::{HardwareEvent, MessageParser};
//! use rust_decimal::Decimal;
//!
//! let event = MessageParser::parse("coin:5.00").unwrap();
//! assert_eq!(event, HardwareEvent::Coin { amount: Decimal::new(500, 2) });
//!
//! assert!(MessageParser::parse("COIN:150").is_err());
//! assert!(MessageParser::parse("STATUS:").is_err());
//!
//! let events = MessageParser::parse_buffer(b"HEARTBEAT\nGARBAGE\nCOIN:10\n");
//! assert_eq!(events.len(), 2);
//! ```

use crate::{HardwareEvent, ParseError, ParseResult};
use coinbox_core::constants::{
    CMD_COIN, CMD_ERROR, CMD_HEARTBEAT, CMD_STATUS, DELIMITER_PAYLOAD, LINE_TERMINATOR,
    MAX_COIN_AMOUNT,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

/// Stateless parser for coin acceptor messages.
pub struct MessageParser;

impl MessageParser {
    /// Parse a single line.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the line is blank, the command is
    /// unknown, a payload-bearing command has an empty payload, or a coin
    /// amount is not a number in `(0, 100]`.
    pub fn parse(line: &str) -> ParseResult<HardwareEvent> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (command, payload) = match line.split_once(DELIMITER_PAYLOAD) {
            Some((command, payload)) => (command, payload),
            None => (line, ""),
        };

        if command.eq_ignore_ascii_case(CMD_HEARTBEAT) {
            return Ok(HardwareEvent::Heartbeat);
        }

        if command.eq_ignore_ascii_case(CMD_COIN) {
            Self::require_payload(CMD_COIN, payload)?;
            Self::parse_coin(payload)
        } else if command.eq_ignore_ascii_case(CMD_STATUS) {
            Self::require_payload(CMD_STATUS, payload)?;
            Ok(HardwareEvent::Status {
                text: payload.to_string(),
            })
        } else if command.eq_ignore_ascii_case(CMD_ERROR) {
            Self::require_payload(CMD_ERROR, payload)?;
            Ok(HardwareEvent::Error {
                message: payload.to_string(),
            })
        } else {
            Err(ParseError::UnknownCommand(command.to_string()))
        }
    }

    /// Parse every line of a raw buffer.
    ///
    /// Blank lines are skipped and malformed lines are dropped with a debug
    /// log; the remaining events keep their input order. Bytes that are not
    /// valid UTF-8 are replaced, which makes the affected line fail to parse
    /// rather than the whole buffer.
    pub fn parse_buffer(bytes: &[u8]) -> Vec<HardwareEvent> {
        let text = String::from_utf8_lossy(bytes);

        text.split(LINE_TERMINATOR)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match Self::parse(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!(line, error = %e, "Dropping malformed device line");
                    None
                }
            })
            .collect()
    }

    fn require_payload(command: &'static str, payload: &str) -> ParseResult<()> {
        if payload.trim().is_empty() {
            return Err(ParseError::MissingPayload(command));
        }
        Ok(())
    }

    fn parse_coin(payload: &str) -> ParseResult<HardwareEvent> {
        let raw = payload.trim();

        let amount = Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .map_err(|_| ParseError::InvalidAmount(raw.to_string()))?;

        if amount <= Decimal::ZERO || amount > Decimal::from(MAX_COIN_AMOUNT) {
            return Err(ParseError::AmountOutOfRange(amount));
        }

        Ok(HardwareEvent::Coin { amount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn coin(s: &str) -> HardwareEvent {
        HardwareEvent::Coin {
            amount: Decimal::from_str(s).unwrap(),
        }
    }

    #[rstest]
    #[case("COIN:5.00", "5.00")]
    #[case("COIN:1", "1")]
    #[case("coin:20", "20")]
    #[case("Coin:0.25", "0.25")]
    #[case("COIN:100", "100")]
    #[case("COIN:100.00", "100.00")]
    #[case("  COIN:10  ", "10")]
    #[case("COIN: 5", "5")]
    fn test_parse_valid_coin(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(MessageParser::parse(input).unwrap(), coin(expected));
    }

    #[test]
    fn test_coin_amount_is_exact() {
        let HardwareEvent::Coin { amount } = MessageParser::parse("COIN:0.10").unwrap() else {
            panic!("expected coin");
        };
        assert_eq!(amount.to_string(), "0.10");
        assert_eq!(amount * Decimal::from(3), Decimal::from_str("0.30").unwrap());
    }

    #[test]
    fn test_coin_scientific_notation() {
        assert_eq!(MessageParser::parse("COIN:1e1").unwrap(), coin("10"));
    }

    #[rstest]
    #[case("COIN:0")]
    #[case("COIN:0.00")]
    #[case("COIN:-5")]
    #[case("COIN:100.01")]
    #[case("COIN:150")]
    fn test_parse_coin_out_of_range(#[case] input: &str) {
        assert!(matches!(
            MessageParser::parse(input),
            Err(ParseError::AmountOutOfRange(_))
        ));
    }

    #[rstest]
    #[case("COIN:abc")]
    #[case("COIN:5.00.1")]
    #[case("COIN:NaN")]
    #[case("COIN:inf")]
    fn test_parse_coin_not_a_number(#[case] input: &str) {
        assert!(matches!(
            MessageParser::parse(input),
            Err(ParseError::InvalidAmount(_))
        ));
    }

    #[rstest]
    #[case("COIN")]
    #[case("COIN:")]
    #[case("STATUS:")]
    #[case("ERROR")]
    #[case("ERROR:   ")]
    fn test_parse_missing_payload(#[case] input: &str) {
        assert!(matches!(
            MessageParser::parse(input),
            Err(ParseError::MissingPayload(_))
        ));
    }

    #[rstest]
    #[case("HEARTBEAT")]
    #[case("heartbeat")]
    #[case("HEARTBEAT:ignored")]
    fn test_parse_heartbeat(#[case] input: &str) {
        assert_eq!(MessageParser::parse(input).unwrap(), HardwareEvent::Heartbeat);
    }

    #[test]
    fn test_parse_status_and_error() {
        assert_eq!(
            MessageParser::parse("STATUS:READY").unwrap(),
            HardwareEvent::Status {
                text: "READY".to_string()
            }
        );
        assert_eq!(
            MessageParser::parse("error:COIN_JAM").unwrap(),
            HardwareEvent::Error {
                message: "COIN_JAM".to_string()
            }
        );
    }

    #[test]
    fn test_payload_splits_on_first_delimiter() {
        assert_eq!(
            MessageParser::parse("STATUS:TEMP:42").unwrap(),
            HardwareEvent::Status {
                text: "TEMP:42".to_string()
            }
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_parse_empty(#[case] input: &str) {
        assert_eq!(MessageParser::parse(input), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            MessageParser::parse("DISPENSE:5"),
            Err(ParseError::UnknownCommand("DISPENSE".to_string()))
        );
    }

    #[test]
    fn test_parse_buffer_keeps_order_and_skips_garbage() {
        let buffer = b"HEARTBEAT\r\n\nCOIN:5.00\nBOGUS\nCOIN:999\nSTATUS:READY\nCOIN:1\n";
        let events = MessageParser::parse_buffer(buffer);

        assert_eq!(
            events,
            vec![
                HardwareEvent::Heartbeat,
                coin("5.00"),
                HardwareEvent::Status {
                    text: "READY".to_string()
                },
                coin("1"),
            ]
        );
    }

    #[test]
    fn test_parse_buffer_without_trailing_newline() {
        let events = MessageParser::parse_buffer(b"COIN:10");
        assert_eq!(events, vec![coin("10")]);
    }

    #[test]
    fn test_parse_buffer_empty() {
        assert!(MessageParser::parse_buffer(b"").is_empty());
        assert!(MessageParser::parse_buffer(b"\n\n  \n").is_empty());
    }

    #[test]
    fn test_parse_buffer_invalid_utf8_only_drops_line() {
        let mut buffer = b"COIN:\xFF5\n".to_vec();
        buffer.extend_from_slice(b"HEARTBEAT\n");

        assert_eq!(
            MessageParser::parse_buffer(&buffer),
            vec![HardwareEvent::Heartbeat]
        );
    }
}
