//! The polling loop around [`CoinAcceptorService`].
//!
//! One tick drains the link, handles every complete message and then sleeps
//! for the poll interval. Idle ticks also drop banked coins whose TTL ran
//! out. Shutdown is cooperative: the token is looked at
//! between ticks, so an event being handled (and its ledger transaction)
//! always finishes first.

use crate::service::CoinAcceptorService;
use coinbox_core::KeyValueStore;
use coinbox_core::constants::HEALTH_CHECK_EVERY_MESSAGES;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub poll_interval: Duration,

    /// Where to reconnect after the link drops.
    pub serial_port: String,

    pub baud_rate: u32,

    /// Minimum time between reconnect attempts.
    pub reconnect_interval: Duration,

    /// How often an idle link looks for banked coins that expired.
    pub expiry_check_interval: Duration,
}

impl ListenerConfig {
    pub fn new(serial_port: impl Into<String>, baud_rate: u32, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            serial_port: serial_port.into(),
            baud_rate,
            reconnect_interval: Duration::from_secs(5),
            expiry_check_interval: Duration::from_secs(5),
        }
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn expiry_check_interval(mut self, interval: Duration) -> Self {
        self.expiry_check_interval = interval;
        self
    }
}

pub struct ListenerLoop<S> {
    service: CoinAcceptorService<S>,
    config: ListenerConfig,
    shutdown: CancellationToken,
    processed: u64,
    last_connect_attempt: Option<Instant>,
    last_expiry_check: Option<Instant>,
    reported_healthy: Option<bool>,
}

impl<S: KeyValueStore> ListenerLoop<S> {
    pub fn new(
        service: CoinAcceptorService<S>,
        config: ListenerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            config,
            shutdown,
            processed: 0,
            last_connect_attempt: None,
            last_expiry_check: None,
            reported_healthy: None,
        }
    }

    pub fn service(&self) -> &CoinAcceptorService<S> {
        &self.service
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Run until the shutdown token is cancelled, then disconnect.
    ///
    /// Returns the number of messages processed.
    pub async fn run(mut self) -> u64 {
        info!(
            device_id = %self.service.device_id(),
            pathway = self.service.pathway().name(),
            poll_interval = ?self.config.poll_interval,
            "Listener started"
        );

        while !self.shutdown.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.service.disconnect().await;
        info!(
            device_id = %self.service.device_id(),
            processed = self.processed,
            "Listener stopped"
        );
        self.processed
    }

    /// One poll of the link.
    pub async fn tick(&mut self) {
        if !self.service.is_connected() {
            self.try_reconnect().await;
            return;
        }

        let events = match self.service.read_events().await {
            Ok(events) => events,
            Err(e) => {
                error!(device_id = %self.service.device_id(), error = %e, "Coin acceptor read failed");
                return;
            }
        };

        if events.is_empty() {
            if self.service.health().is_connection_stale(None).await {
                self.check_health().await;
            }
            self.check_expired_coins().await;
            return;
        }

        for event in events {
            let outcome = self.service.handle_event(event).await;
            debug!(?outcome, "Event handled");

            self.processed += 1;
            if self.processed % HEALTH_CHECK_EVERY_MESSAGES == 0 {
                self.check_health().await;
            }
        }
    }

    /// Log the device health when it changed since the last check.
    async fn check_health(&mut self) {
        let status = self.service.status().await;
        if self.reported_healthy == Some(status.healthy) {
            debug!(device_id = %status.device_id, healthy = status.healthy, "Health unchanged");
            return;
        }
        self.reported_healthy = Some(status.healthy);

        if status.healthy {
            info!(device_id = %status.device_id, messages = status.message_count, "Coin acceptor healthy");
        } else {
            warn!(
                device_id = %status.device_id,
                connected = status.connected,
                last_heartbeat = ?status.last_heartbeat,
                "Coin acceptor unhealthy"
            );
        }
    }

    async fn check_expired_coins(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_expiry_check
            && now.duration_since(last) < self.config.expiry_check_interval
        {
            return;
        }
        self.last_expiry_check = Some(now);

        self.service.pathway().reap_expired().await;
    }

    async fn try_reconnect(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_connect_attempt
            && now.duration_since(last) < self.config.reconnect_interval
        {
            return;
        }
        self.last_connect_attempt = Some(now);

        let port = self.config.serial_port.clone();
        if let Err(e) = self.service.connect(&port, self.config.baud_rate).await {
            warn!(device_id = %self.service.device_id(), port = %port, error = %e, "Reconnect failed");
        }
    }
}
