//! Coin acceptor health tracking.
//!
//! The last heartbeat and last status live in the shared key-value store,
//! keyed by device, so any task or process can read them. Entries carry a
//! bounded TTL: a device that disappears drops out of the store on its own.
//!
//! Health is advisory. An unhealthy device does not block crediting; it is
//! surfaced on status snapshots and logged by the listener. A record that
//! cannot be read counts as missing.

use chrono::{DateTime, Utc};
use coinbox_core::{DeviceId, KeyValueStore, KioskConfig, StoreValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HealthMonitor<S> {
    device_id: DeviceId,
    store: Arc<S>,
    heartbeat_timeout: Duration,
    record_ttl: Duration,
    message_count: u64,
}

impl<S: KeyValueStore> HealthMonitor<S> {
    pub fn new(
        device_id: DeviceId,
        store: Arc<S>,
        heartbeat_timeout: Duration,
        record_ttl: Duration,
    ) -> Self {
        Self {
            device_id,
            store,
            heartbeat_timeout,
            record_ttl,
            message_count: 0,
        }
    }

    /// Build a monitor with the timeouts from `config`.
    pub fn from_config(device_id: DeviceId, store: Arc<S>, config: &KioskConfig) -> Self {
        Self::new(
            device_id,
            store,
            config.heartbeat_timeout,
            config.health_record_ttl,
        )
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Record a heartbeat received now.
    pub async fn update_heartbeat(&self) -> coinbox_core::Result<()> {
        self.set_last_heartbeat(Utc::now()).await
    }

    /// Overwrite the last heartbeat, for tests and operator tooling.
    pub async fn set_last_heartbeat(&self, at: DateTime<Utc>) -> coinbox_core::Result<()> {
        self.store
            .put(
                &self.heartbeat_key(),
                StoreValue::Timestamp(at),
                self.record_ttl,
            )
            .await
    }

    pub async fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.read(&self.heartbeat_key())
            .await
            .and_then(|value| value.as_timestamp())
    }

    /// Whether the last heartbeat is younger than the heartbeat timeout.
    ///
    /// `false` before any heartbeat has been recorded.
    pub async fn is_healthy(&self) -> bool {
        match self.heartbeat_age().await {
            Some(age) => age < self.heartbeat_timeout,
            None => false,
        }
    }

    /// Whether the last heartbeat is older than `timeout` (default: the
    /// configured heartbeat timeout).
    ///
    /// `true` before any heartbeat has been recorded.
    pub async fn is_connection_stale(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.heartbeat_timeout);
        match self.heartbeat_age().await {
            Some(age) => age > timeout,
            None => true,
        }
    }

    pub async fn update_status(&self, status: &str) -> coinbox_core::Result<()> {
        debug!(device_id = %self.device_id, status, "Coin acceptor status update");
        self.store
            .put(
                &self.status_key(),
                StoreValue::Text(status.to_string()),
                self.record_ttl,
            )
            .await
    }

    pub async fn status(&self) -> Option<String> {
        self.read(&self.status_key())
            .await
            .and_then(|value| value.as_text().map(str::to_owned))
    }

    pub fn increment_message_count(&mut self) {
        self.message_count += 1;
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn reset_message_count(&mut self) {
        self.message_count = 0;
    }

    /// Time since the last heartbeat. A heartbeat stamped in the future
    /// counts as just received.
    async fn heartbeat_age(&self) -> Option<Duration> {
        let last = self.last_heartbeat().await?;
        Some((Utc::now() - last).to_std().unwrap_or(Duration::ZERO))
    }

    async fn read(&self, key: &str) -> Option<StoreValue> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(device_id = %self.device_id, key, error = %e, "Health record unreadable");
                None
            }
        }
    }

    fn heartbeat_key(&self) -> String {
        format!("coinbox.{}.last_heartbeat", self.device_id)
    }

    fn status_key(&self) -> String {
        format!("coinbox.{}.status", self.device_id)
    }
}

impl<S> std::fmt::Debug for HealthMonitor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("device_id", &self.device_id)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("message_count", &self.message_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinbox_core::MemoryStore;

    const TIMEOUT: Duration = Duration::from_secs(30);
    const TTL: Duration = Duration::from_secs(300);

    fn monitor_with(store: Arc<MemoryStore>) -> HealthMonitor<MemoryStore> {
        HealthMonitor::new(
            DeviceId::new("ESP32_COIN_001").unwrap(),
            store,
            TIMEOUT,
            TTL,
        )
    }

    fn monitor() -> HealthMonitor<MemoryStore> {
        monitor_with(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_unhealthy_before_first_heartbeat() {
        let health = monitor();
        assert!(!health.is_healthy().await);
        assert!(health.is_connection_stale(None).await);
        assert!(health.last_heartbeat().await.is_none());
    }

    #[tokio::test]
    async fn test_healthy_after_heartbeat() {
        let health = monitor();
        health.update_heartbeat().await.unwrap();

        assert!(health.is_healthy().await);
        assert!(!health.is_connection_stale(None).await);
        assert!(health.last_heartbeat().await.is_some());
    }

    #[tokio::test]
    async fn test_unhealthy_after_timeout() {
        let health = monitor();
        health
            .set_last_heartbeat(Utc::now() - chrono::Duration::seconds(31))
            .await
            .unwrap();

        assert!(!health.is_healthy().await);
        assert!(health.is_connection_stale(None).await);
    }

    #[tokio::test]
    async fn test_stale_with_custom_timeout() {
        let health = monitor();
        health
            .set_last_heartbeat(Utc::now() - chrono::Duration::seconds(20))
            .await
            .unwrap();

        assert!(health.is_healthy().await);
        assert!(!health.is_connection_stale(None).await);
        assert!(health.is_connection_stale(Some(Duration::from_secs(10))).await);
    }

    #[tokio::test]
    async fn test_future_heartbeat_counts_as_fresh() {
        let health = monitor();
        health
            .set_last_heartbeat(Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert!(health.is_healthy().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_expires_from_store() {
        let health = monitor();
        health.update_heartbeat().await.unwrap();
        health.update_status("READY").await.unwrap();

        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert!(health.last_heartbeat().await.is_none());
        assert!(health.status().await.is_none());
        assert!(!health.is_healthy().await);
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let health = monitor();
        assert!(health.status().await.is_none());

        health.update_status("READY").await.unwrap();
        health.update_status("COIN_JAM").await.unwrap();

        assert_eq!(health.status().await.as_deref(), Some("COIN_JAM"));
    }

    #[test]
    fn test_message_count() {
        let mut health = monitor();
        health.increment_message_count();
        health.increment_message_count();
        assert_eq!(health.message_count(), 2);

        health.reset_message_count();
        assert_eq!(health.message_count(), 0);
    }

    #[tokio::test]
    async fn test_record_visible_to_other_readers() {
        let store = Arc::new(MemoryStore::new());
        let writer = monitor_with(Arc::clone(&store));
        let reader = monitor_with(store);

        writer.update_heartbeat().await.unwrap();
        writer.update_status("READY").await.unwrap();

        assert!(reader.is_healthy().await);
        assert_eq!(reader.status().await.as_deref(), Some("READY"));
    }

    #[tokio::test]
    async fn test_devices_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let a = monitor_with(Arc::clone(&store));
        let b = HealthMonitor::new(DeviceId::new("OTHER").unwrap(), store, TIMEOUT, TTL);

        a.update_heartbeat().await.unwrap();

        assert!(a.is_healthy().await);
        assert!(!b.is_healthy().await);
    }

    #[tokio::test]
    async fn test_foreign_value_reads_as_missing() {
        let store = Arc::new(MemoryStore::new());
        let health = monitor_with(Arc::clone(&store));
        store
            .put(
                "coinbox.ESP32_COIN_001.last_heartbeat",
                StoreValue::Text("yesterday".into()),
                TTL,
            )
            .await
            .unwrap();

        assert!(health.last_heartbeat().await.is_none());
        assert!(!health.is_healthy().await);
    }
}
