//! Error types for the coin acceptor link.
//!
//! Every variant is a transient hardware condition: the listener logs it and
//! keeps polling, and the caller decides whether to reconnect.

use coinbox_core::ErrorKind;

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Serial port not found: {path}")]
    PortNotFound { path: String },

    #[error("Failed to configure serial port {path}: {message}")]
    ConfigurationFailed { path: String, message: String },

    #[error("Failed to open serial port {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("Device not connected: {device}")]
    NotConnected { device: String },

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn port_not_found(path: impl Into<String>) -> Self {
        Self::PortNotFound { path: path.into() }
    }

    pub fn configuration_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigurationFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn open_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_connected(device: impl Into<String>) -> Self {
        Self::NotConnected {
            device: device.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::HardwareUnavailable
    }
}
