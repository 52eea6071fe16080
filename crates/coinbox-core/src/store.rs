//! Shared key-value store with per-entry time-to-live.
//!
//! The health record and the pending coin total are written by the listener
//! and read by request handlers that may run in other tasks or other
//! processes. Both go through a [`KeyValueStore`] that is injected
//! explicitly into every component that needs it, so there is no
//! process-wide cache singleton.
//!
//! [`MemoryStore`] is the in-process implementation, used by tests and
//! single-process tools. Expiry is measured with [`tokio::time::Instant`],
//! which lets tests drive it with a paused clock. The listener binary uses
//! the SQLite-backed store from `coinbox-storage` so the payment page can
//! see the same entries.
//!
//! # Examples
//!
//! ```
//! use coinbox_core::store::{KeyValueStore, MemoryStore, StoreValue};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> coinbox_core::Result<()> {
//! let store = MemoryStore::new();
//! store
//!     .put("device.A.status", StoreValue::Text("READY".into()), Duration::from_secs(60))
//!     .await?;
//!
//! assert_eq!(
//!     store.get("device.A.status").await?,
//!     Some(StoreValue::Text("READY".to_string()))
//! );
//!
//! store.forget("device.A.status").await?;
//! assert!(store.get("device.A.status").await?.is_none());
//! # Ok(())
//! # }
//! ```

#![allow(async_fn_in_trait)]

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Value held by a store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    /// Point in time, e.g. the last heartbeat.
    Timestamp(DateTime<Utc>),

    /// Free text, e.g. the last device status.
    Text(String),

    /// Monetary amount, e.g. the pending coin total.
    Amount(Decimal),
}

impl StoreValue {
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            Self::Amount(amount) => Some(*amount),
            _ => None,
        }
    }
}

/// Capability interface over the shared store.
///
/// All operations are atomic with respect to each other. Apart from
/// [`take_expired`](KeyValueStore::take_expired), expired entries behave
/// exactly like missing ones.
///
/// # Errors
///
/// Every operation fails with `Error::StoreBackend` when the backing store
/// cannot be read or written.
pub trait KeyValueStore: Send + Sync {
    /// Read a live entry.
    async fn get(&self, key: &str) -> Result<Option<StoreValue>>;

    /// Write an entry that expires after `ttl`, replacing any previous value.
    async fn put(&self, key: &str, value: StoreValue, ttl: Duration) -> Result<()>;

    /// Remove an entry. Missing keys are ignored.
    async fn forget(&self, key: &str) -> Result<()>;

    /// Add `by` to an amount entry and return the new total.
    ///
    /// A missing or expired entry starts at zero and gets `ttl`; a live
    /// entry keeps its original expiry.
    ///
    /// # Errors
    ///
    /// Also `Error::StoreTypeMismatch` if the live entry is not an amount.
    async fn increment(&self, key: &str, by: Decimal, ttl: Duration) -> Result<Decimal>;

    /// Remove an entry and return what it held, if it was still live.
    async fn take(&self, key: &str) -> Result<Option<StoreValue>>;

    /// Remove an entry only if it has expired, returning what it held.
    async fn take_expired(&self, key: &str) -> Result<Option<StoreValue>>;
}

#[derive(Debug)]
struct Entry {
    value: StoreValue,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.lock().retain(|_, entry| entry.is_live(now));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoreValue>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: StoreValue, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, by: Decimal, ttl: Duration) -> Result<Decimal> {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => match entry.value {
                StoreValue::Amount(current) => {
                    let total = current + by;
                    entry.value = StoreValue::Amount(total);
                    Ok(total)
                }
                _ => Err(Error::StoreTypeMismatch {
                    key: key.to_string(),
                    expected: "an amount",
                }),
            },
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: StoreValue::Amount(by),
                        expires_at: now + ttl,
                    },
                );
                Ok(by)
            }
        }
    }

    async fn take(&self, key: &str) -> Result<Option<StoreValue>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn take_expired(&self, key: &str) -> Result<Option<StoreValue>> {
        let now = Instant::now();
        let mut entries = self.lock();

        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            Ok(entries.remove(key).map(|entry| entry.value))
        } else {
            Ok(None)
        }
    }
}
