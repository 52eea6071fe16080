//! Coin acceptor link for the kiosk.
//!
//! This crate owns everything between the serial line and the parsed event
//! stream: the channel that talks to the device and the health monitor that
//! tracks whether the device is still alive.
//!
//! # Channels
//!
//! [`SerialChannel`] is the contract for the device link. Two
//! implementations exist:
//!
//! - [`SerialConnection`] opens a real serial port through the `serialport`
//!   crate.
//! - [`MockSerial`] is driven by a [`MockSerialHandle`] for tests and for
//!   running the listener without hardware.
//!
//! [`AnyChannel`] dispatches between them, because native `async fn` in
//! traits cannot be used through `dyn`.
//!
//! ```
//! use coinbox_core::DeviceId;
//! use coinbox_hardware::{MockSerial, SerialChannel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> coinbox_hardware::Result<()> {
//! let device_id = DeviceId::new("ESP32_COIN_001").unwrap();
//! let (mut channel, handle) = MockSerial::new(device_id);
//!
//! channel.connect("/dev/ttyUSB0", 115_200).await?;
//! handle.inject_line("COIN:5.00");
//!
//! assert_eq!(channel.read_raw().await?, b"COIN:5.00\n");
//! channel.send("ACK:COIN:5.00").await?;
//! assert_eq!(handle.sent(), vec!["ACK:COIN:5.00".to_string()]);
//! # Ok(())
//! # }
//! ```
//!
//! # Health
//!
//! [`HealthMonitor`] keeps the last heartbeat and last status in the shared
//! [`KeyValueStore`](coinbox_core::KeyValueStore) so request handlers in
//! other tasks or processes can read them. Health is independent of
//! connection state: a connected device that stopped sending heartbeats is
//! unhealthy.

pub mod channel;
pub mod devices;
pub mod error;
pub mod health;
pub mod mock;
pub mod serial;

pub use channel::{ConnectionState, SerialChannel};
pub use devices::AnyChannel;
pub use error::{HardwareError, Result};
pub use health::HealthMonitor;
pub use mock::{MockSerial, MockSerialHandle};
pub use serial::SerialConnection;
