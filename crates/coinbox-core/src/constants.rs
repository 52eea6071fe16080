//! Core constants for the coin acceptor line protocol and kiosk defaults.
//!
//! The coin acceptor talks newline-delimited ASCII over a serial line:
//!
//! ```text
//! COIN:5.00\n
//! STATUS:READY\n
//! ERROR:JAM\n
//! HEARTBEAT\n
//! ```
//!
//! Commands are separated from their payload by [`DELIMITER_PAYLOAD`] and
//! matched case-insensitively. Everything else in this module is a default
//! for [`KioskConfig`](crate::KioskConfig) or a storage lifetime.

use std::time::Duration;

// ============================================================================
// Line protocol
// ============================================================================

/// Separates the command token from its payload (`COIN:5.00`).
pub const DELIMITER_PAYLOAD: char = ':';

/// Terminates every message on the wire, in both directions.
pub const LINE_TERMINATOR: char = '\n';

/// Coin insertion command.
pub const CMD_COIN: &str = "COIN";

/// Free-form status report command.
pub const CMD_STATUS: &str = "STATUS";

/// Device-side error report command.
pub const CMD_ERROR: &str = "ERROR";

/// Liveness signal; carries no payload.
pub const CMD_HEARTBEAT: &str = "HEARTBEAT";

/// Positive acknowledgement prefix sent back to the device.
pub const REPLY_ACK: &str = "ACK";

/// Negative acknowledgement prefix sent back to the device.
pub const REPLY_NAK: &str = "NAK";

/// Largest amount a single `COIN` message may carry.
///
/// Anything above this is treated as a sensor glitch and dropped rather
/// than clamped.
pub const MAX_COIN_AMOUNT: u32 = 100;

// ============================================================================
// Serial defaults
// ============================================================================

/// Default serial device of the coin acceptor.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Default line speed of the coin acceptor firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Maximum length of a device identifier.
pub const MAX_DEVICE_ID_LENGTH: usize = 50;

/// Maximum length of a web session identifier.
pub const MAX_SESSION_ID_LENGTH: usize = 100;

// ============================================================================
// Health and store lifetimes
// ============================================================================

/// Default heartbeat timeout in seconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Lifetime of health record entries in the shared store.
///
/// Entries of devices that went away expire on their own.
pub const HEALTH_RECORD_TTL: Duration = Duration::from_secs(5 * 60);

/// Lifetime of the pending coin total for the device-scoped pathway.
pub const PENDING_COIN_TTL: Duration = Duration::from_secs(60);

// ============================================================================
// Listener defaults
// ============================================================================

/// Default sleep between listener ticks, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// The listener checks device health every this many processed messages.
pub const HEALTH_CHECK_EVERY_MESSAGES: u64 = 100;

/// Default accepted coin denominations (whole currency units).
pub const DEFAULT_DENOMINATIONS: [u32; 4] = [1, 5, 10, 20];

// ============================================================================
// Ledger defaults
// ============================================================================

/// Default number of rows returned by transaction history queries.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Default number of recent coins shown on the payment status.
pub const DEFAULT_RECENT_COINS_LIMIT: i64 = 10;
