//! Real serial port channel.
//!
//! Opens the coin acceptor port as 8N1 raw with no flow control. Reads only
//! ever take what the driver already buffered and writes never wait for the
//! output to drain, so a tick never waits on the device.

use crate::channel::{ConnectionState, SerialChannel, frame_message};
use crate::{HardwareError, Result};
use coinbox_core::DeviceId;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Upper bound on a single drain, so a flooding device cannot stall a tick.
const MAX_READ_BYTES: usize = 4096;

pub struct SerialConnection {
    device_id: DeviceId,
    port: Option<Box<dyn SerialPort>>,
    state: Option<ConnectionState>,
}

impl SerialConnection {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            port: None,
            state: None,
        }
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>> {
        if !Path::new(path).exists() {
            return Err(HardwareError::port_not_found(path));
        }

        serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::InvalidInput => {
                    HardwareError::configuration_failed(path, e.description)
                }
                _ => HardwareError::open_failed(path, e.description),
            })
    }

    /// Drop the port after an I/O failure.
    fn mark_failed(&mut self) {
        self.port = None;
        if let Some(state) = self.state.as_mut() {
            state.is_open = false;
        }
    }
}

/// Hand one framed line to the driver without waiting on the device.
///
/// A full output buffer comes back as `ShortWrite`; any other I/O error
/// means the link is gone.
fn write_line<W: Write + ?Sized>(port: &mut W, line: &[u8]) -> Result<()> {
    let expected = line.len();
    let written = match port.write(line) {
        Ok(n) => n,
        Err(e) if would_block(&e) => 0,
        Err(e) => return Err(HardwareError::Io(e)),
    };

    if written < expected {
        return Err(HardwareError::ShortWrite { written, expected });
    }
    Ok(())
}

/// The port is opened with a zero timeout, so "nothing moved yet" surfaces
/// as one of these.
fn would_block(e: &std::io::Error) -> bool {
    matches!(e.kind(), IoErrorKind::TimedOut | IoErrorKind::WouldBlock)
}

impl std::fmt::Debug for SerialConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection")
            .field("device_id", &self.device_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SerialChannel for SerialConnection {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    async fn connect(&mut self, path: &str, baud_rate: u32) -> Result<()> {
        if self.port.is_some() {
            self.disconnect().await;
        }

        match Self::open_port(path, baud_rate) {
            Ok(port) => {
                self.port = Some(port);
                self.state = Some(ConnectionState::open(
                    path,
                    baud_rate,
                    self.device_id.clone(),
                ));
                info!(device_id = %self.device_id, port = path, baud_rate, "Coin acceptor connected");
                Ok(())
            }
            Err(e) => {
                error!(device_id = %self.device_id, port = path, error = %e, "Coin acceptor connection failed");
                Err(e)
            }
        }
    }

    async fn read_raw(&mut self) -> Result<Vec<u8>> {
        let Some(port) = self.port.as_mut() else {
            return Ok(Vec::new());
        };

        let available = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                error!(device_id = %self.device_id, error = %e, "Serial port status failed");
                self.mark_failed();
                return Err(HardwareError::Io(e.into()));
            }
        };

        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; available.min(MAX_READ_BYTES)];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                debug!(device_id = %self.device_id, bytes = n, "Read from coin acceptor");
                Ok(buffer)
            }
            Err(e) if would_block(&e) => Ok(Vec::new()),
            Err(e) => {
                error!(device_id = %self.device_id, error = %e, "Serial read failed");
                self.mark_failed();
                Err(HardwareError::Io(e))
            }
        }
    }

    async fn send(&mut self, message: &str) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            warn!(device_id = %self.device_id, "Cannot send message: coin acceptor not connected");
            return Err(HardwareError::not_connected(self.device_id.as_str()));
        };

        let line = frame_message(message);

        match write_line(port.as_mut(), line.as_bytes()) {
            Ok(()) => {
                debug!(device_id = %self.device_id, message = line.trim_end(), "Sent to coin acceptor");
                Ok(())
            }
            Err(e @ HardwareError::ShortWrite { .. }) => {
                warn!(device_id = %self.device_id, error = %e, "Serial output buffer full");
                Err(e)
            }
            Err(e) => {
                error!(device_id = %self.device_id, error = %e, "Serial write failed");
                self.mark_failed();
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.port.take().is_some() {
            info!(device_id = %self.device_id, "Coin acceptor disconnected");
        }
        if let Some(state) = self.state.as_mut() {
            state.is_open = false;
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn state(&self) -> Option<&ConnectionState> {
        self.state.as_ref()
    }
}
