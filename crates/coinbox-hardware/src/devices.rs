//! Enum wrapper for channel dispatch.
//!
//! Native `async fn` in traits is not object-safe, so the listener cannot
//! hold a `Box<dyn SerialChannel>`. [`AnyChannel`] gives it one concrete
//! type that covers both the real port and the mock.
//!
//! ```
//! use coinbox_core::DeviceId;
//! use coinbox_hardware::{AnyChannel, MockSerial, SerialChannel};
//!
//! let (mock, _handle) = MockSerial::new(DeviceId::new("KIOSK_1").unwrap());
//! let channel = AnyChannel::Mock(mock);
//! assert!(!channel.is_connected());
//! ```

use crate::channel::{ConnectionState, SerialChannel};
use crate::mock::MockSerial;
use crate::serial::SerialConnection;
use crate::Result;
use coinbox_core::DeviceId;

#[derive(Debug)]
pub enum AnyChannel {
    Serial(SerialConnection),
    Mock(MockSerial),
}

impl SerialChannel for AnyChannel {
    fn device_id(&self) -> &DeviceId {
        match self {
            Self::Serial(channel) => channel.device_id(),
            Self::Mock(channel) => channel.device_id(),
        }
    }

    async fn connect(&mut self, path: &str, baud_rate: u32) -> Result<()> {
        match self {
            Self::Serial(channel) => channel.connect(path, baud_rate).await,
            Self::Mock(channel) => channel.connect(path, baud_rate).await,
        }
    }

    async fn read_raw(&mut self) -> Result<Vec<u8>> {
        match self {
            Self::Serial(channel) => channel.read_raw().await,
            Self::Mock(channel) => channel.read_raw().await,
        }
    }

    async fn send(&mut self, message: &str) -> Result<()> {
        match self {
            Self::Serial(channel) => channel.send(message).await,
            Self::Mock(channel) => channel.send(message).await,
        }
    }

    async fn disconnect(&mut self) {
        match self {
            Self::Serial(channel) => channel.disconnect().await,
            Self::Mock(channel) => channel.disconnect().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Serial(channel) => channel.is_connected(),
            Self::Mock(channel) => channel.is_connected(),
        }
    }

    fn state(&self) -> Option<&ConnectionState> {
        match self {
            Self::Serial(channel) => channel.state(),
            Self::Mock(channel) => channel.state(),
        }
    }
}

impl From<SerialConnection> for AnyChannel {
    fn from(channel: SerialConnection) -> Self {
        Self::Serial(channel)
    }
}

impl From<MockSerial> for AnyChannel {
    fn from(channel: MockSerial) -> Self {
        Self::Mock(channel)
    }
}
