//! Serial channel contract.
//!
//! The channel is owned exclusively by the listener loop. Nothing else reads
//! from or writes to the device.

#![allow(async_fn_in_trait)]

use crate::Result;
use coinbox_core::DeviceId;
use serde::{Deserialize, Serialize};

/// Snapshot of an open (or last opened) link.
///
/// Created by `connect`. `is_open` drops to `false` on `disconnect` or when
/// an I/O failure is detected; a closed link is never reopened implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub is_open: bool,
    pub device_path: String,
    pub baud_rate: u32,
    pub device_id: DeviceId,
}

impl ConnectionState {
    pub fn open(device_path: &str, baud_rate: u32, device_id: DeviceId) -> Self {
        Self {
            is_open: true,
            device_path: device_path.to_string(),
            baud_rate,
            device_id,
        }
    }
}

/// Byte-level link to a coin acceptor.
///
/// Implementations never block the caller: `read_raw` returns whatever is
/// buffered right now, possibly nothing.
pub trait SerialChannel: Send {
    /// Identifier of the device behind this channel.
    fn device_id(&self) -> &DeviceId;

    /// Open the link in non-blocking read mode.
    ///
    /// Connecting an already open channel closes the old link first.
    ///
    /// # Errors
    ///
    /// Fails if the device path does not exist, the line settings cannot be
    /// applied, or the open call fails. The channel stays closed.
    async fn connect(&mut self, path: &str, baud_rate: u32) -> Result<()>;

    /// Drain the bytes currently buffered by the device.
    ///
    /// Returns an empty buffer if nothing is available or the channel is
    /// not connected.
    ///
    /// # Errors
    ///
    /// An I/O failure closes the channel and is returned once; later calls
    /// return an empty buffer until `connect` is called again.
    async fn read_raw(&mut self) -> Result<Vec<u8>>;

    /// Send one message. Surrounding whitespace is trimmed and the line
    /// terminator appended.
    ///
    /// # Errors
    ///
    /// Fails if the channel is not connected or the write is short.
    async fn send(&mut self, message: &str) -> Result<()>;

    /// Close the link. Idempotent.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// State of the current or last link, `None` before the first connect.
    fn state(&self) -> Option<&ConnectionState>;
}

/// Terminate an outbound message for the wire.
pub(crate) fn frame_message(message: &str) -> String {
    let mut line = message.trim().to_string();
    line.push(coinbox_core::constants::LINE_TERMINATOR);
    line
}
