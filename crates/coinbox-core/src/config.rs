//! Kiosk configuration.
//!
//! [`KioskConfig`] collects everything the coin path needs to start: which
//! device it talks to, how, how long it waits for heartbeats and which coins
//! it credits. The listener binary fills it from CLI flags and environment
//! variables; [`KioskConfig::validate`] runs before anything touches the
//! serial port or the database.

use crate::{
    Denominations, DeviceId, Error, Result,
    constants::{
        DEFAULT_BAUD_RATE, DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS,
        DEFAULT_SERIAL_PORT, HEALTH_RECORD_TTL, MAX_DEVICE_ID_LENGTH, PENDING_COIN_TTL,
    },
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KioskConfig {
    /// Coin acceptor identifier. Required, non-empty.
    pub device_id: String,

    /// Serial device path of the coin acceptor.
    pub serial_port: String,

    /// Serial line speed.
    pub baud_rate: u32,

    /// A device is healthy while its last heartbeat is younger than this.
    pub heartbeat_timeout: Duration,

    /// Coin values credited by the payment coordinator.
    pub accepted_denominations: Denominations,

    /// Sleep between listener ticks.
    pub poll_interval: Duration,

    /// Lifetime of the device-scoped pending coin total.
    pub pending_coin_ttl: Duration,

    /// Lifetime of health record entries in the shared store.
    pub health_record_ttl: Duration,
}

impl KioskConfig {
    /// Create a configuration for `device_id` with every other option at its
    /// default.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            accepted_denominations: Denominations::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            pending_coin_ttl: PENDING_COIN_TTL,
            health_record_ttl: HEALTH_RECORD_TTL,
        }
    }

    pub fn serial_port(mut self, port: impl Into<String>) -> Self {
        self.serial_port = port.into();
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn accepted_denominations(mut self, denominations: Denominations) -> Self {
        self.accepted_denominations = denominations;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn pending_coin_ttl(mut self, ttl: Duration) -> Self {
        self.pending_coin_ttl = ttl;
        self
    }

    /// Check every option and return the typed device ID.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingConfig` for an empty device ID and
    /// `Error::Config` for any other invalid value. Callers at startup
    /// treat both as fatal.
    pub fn validate(&self) -> Result<DeviceId> {
        if self.device_id.trim().is_empty() {
            return Err(Error::MissingConfig("device_id".to_string()));
        }

        let device_id = DeviceId::new(&self.device_id).map_err(|_| {
            Error::Config(format!(
                "device_id must be at most {MAX_DEVICE_ID_LENGTH} characters"
            ))
        })?;

        if self.serial_port.trim().is_empty() {
            return Err(Error::Config("serial_port must not be empty".to_string()));
        }

        if self.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be positive".to_string()));
        }

        if self.heartbeat_timeout.is_zero() {
            return Err(Error::Config(
                "heartbeat_timeout must be positive".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval must be positive".to_string()));
        }

        if self.pending_coin_ttl.is_zero() || self.health_record_ttl.is_zero() {
            return Err(Error::Config("store TTLs must be positive".to_string()));
        }

        // Denominations are validated on construction; this guards
        // deserialized or hand-built values.
        if self.accepted_denominations.is_empty() {
            return Err(Error::Config(
                "accepted_denominations must not be empty".to_string(),
            ));
        }

        Ok(device_id)
    }
}
