//! Coin acceptor service: turns device events into credits and replies.

use crate::pathway::{CoinOutcome, CreditPathway};
use chrono::{DateTime, Utc};
use coinbox_core::{DeviceId, ErrorKind, KeyValueStore};
use coinbox_hardware::{AnyChannel, HealthMonitor, SerialChannel};
use coinbox_protocol::{DeviceReply, HardwareEvent, LineBuffer, format_message};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Operational view of the coin acceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub connected: bool,
    /// Connected and heard from within the heartbeat timeout.
    pub healthy: bool,
    pub stale: bool,
    pub last_status: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub message_count: u64,
}

/// How one event was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Heartbeat,
    CoinAccepted { amount: Decimal, outcome: CoinOutcome },
    /// Refused by business rules; the device was sent a NAK.
    CoinRejected { amount: Decimal, kind: ErrorKind },
    /// Credit could not be recorded; the device was sent an error.
    CoinFailed { amount: Decimal },
    Status,
    DeviceError,
}

/// Owns the device link for its whole lifetime.
pub struct CoinAcceptorService<S> {
    channel: AnyChannel,
    buffer: LineBuffer,
    health: HealthMonitor<S>,
    pathway: CreditPathway<S>,
}

impl<S: KeyValueStore> CoinAcceptorService<S> {
    pub fn new(channel: AnyChannel, health: HealthMonitor<S>, pathway: CreditPathway<S>) -> Self {
        Self {
            channel,
            buffer: LineBuffer::new(),
            health,
            pathway,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        self.health.device_id()
    }

    pub fn health(&self) -> &HealthMonitor<S> {
        &self.health
    }

    pub fn pathway(&self) -> &CreditPathway<S> {
        &self.pathway
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub async fn connect(&mut self, path: &str, baud_rate: u32) -> coinbox_hardware::Result<()> {
        self.buffer.clear();
        self.channel.connect(path, baud_rate).await?;
        info!(device_id = %self.device_id(), path, baud_rate, "Coin acceptor connected");
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        self.channel.disconnect().await;
        self.buffer.clear();
    }

    /// Drain the link and parse every complete line received so far.
    ///
    /// # Errors
    ///
    /// A read failure; the link is closed and half-received lines dropped.
    pub async fn read_events(&mut self) -> coinbox_hardware::Result<Vec<HardwareEvent>> {
        match self.channel.read_raw().await {
            Ok(bytes) => {
                if !bytes.is_empty() {
                    debug!(device_id = %self.device_id(), bytes = bytes.len(), "Raw data received");
                    self.buffer.feed(&bytes);
                }
                Ok(self.buffer.drain_events())
            }
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Act on one event and answer the device.
    pub async fn handle_event(&mut self, event: HardwareEvent) -> EventOutcome {
        self.health.increment_message_count();

        match event {
            HardwareEvent::Heartbeat => {
                if let Err(e) = self.health.update_heartbeat().await {
                    warn!(device_id = %self.device_id(), error = %e, "Heartbeat not recorded");
                }
                self.reply(DeviceReply::AckHeartbeat).await;
                EventOutcome::Heartbeat
            }
            HardwareEvent::Coin { amount } => self.handle_coin(amount).await,
            HardwareEvent::Status { text } => {
                info!(device_id = %self.device_id(), status = %text, "Coin acceptor status");
                if let Err(e) = self.health.update_status(&text).await {
                    warn!(device_id = %self.device_id(), error = %e, "Status not recorded");
                }
                EventOutcome::Status
            }
            HardwareEvent::Error { message } => {
                error!(device_id = %self.device_id(), %message, "Coin acceptor reported an error");
                EventOutcome::DeviceError
            }
        }
    }

    async fn handle_coin(&mut self, amount: Decimal) -> EventOutcome {
        let device_id = self.device_id().clone();

        match self.pathway.accept_coin(amount, &device_id).await {
            Ok(outcome) => {
                info!(device_id = %device_id, %amount, pathway = self.pathway.name(), ?outcome, "Coin accepted");
                self.reply(DeviceReply::AckCoin(amount)).await;
                EventOutcome::CoinAccepted { amount, outcome }
            }
            Err(e) => match e.kind() {
                kind @ (ErrorKind::InvalidInput | ErrorKind::InvalidState | ErrorKind::NotFound) => {
                    warn!(device_id = %device_id, %amount, error = %e, "Coin rejected");
                    self.reply(DeviceReply::NakCoin(amount)).await;
                    EventOutcome::CoinRejected { amount, kind }
                }
                _ => {
                    error!(device_id = %device_id, %amount, error = %e, "Coin could not be credited");
                    self.reply(DeviceReply::CoinProcessingError).await;
                    EventOutcome::CoinFailed { amount }
                }
            },
        }
    }

    async fn reply(&mut self, reply: DeviceReply) {
        let message = format_message(&reply);
        if let Err(e) = self.channel.send(&message).await {
            warn!(device_id = %self.device_id(), %message, error = %e, "Reply to coin acceptor failed");
        }
    }

    pub async fn status(&self) -> DeviceStatus {
        let connected = self.channel.is_connected();
        let last_heartbeat = self.health.last_heartbeat().await;

        DeviceStatus {
            device_id: self.device_id().clone(),
            connected,
            healthy: connected && self.health.is_healthy().await,
            stale: self.health.is_connection_stale(None).await,
            last_status: self.health.status().await,
            last_heartbeat,
            message_count: self.health.message_count(),
        }
    }
}
