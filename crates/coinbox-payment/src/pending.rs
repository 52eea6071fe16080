//! Device-scoped pending coin total.
//!
//! The coin acceptor knows nothing about web sessions. Coins it reports
//! are banked here under the device id, and the next payment status poll
//! claims the whole total for its session. A total nobody claims within its
//! TTL is dropped and logged.

use crate::error::{PaymentError, PaymentResult};
use coinbox_core::constants::PENDING_COIN_TTL;
use coinbox_core::{Denominations, DeviceId, KeyValueStore, KioskConfig};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct PendingCoinBox<S> {
    device_id: DeviceId,
    store: Arc<S>,
    denominations: Denominations,
    ttl: Duration,
}

impl<S: KeyValueStore> PendingCoinBox<S> {
    pub fn new(device_id: DeviceId, store: Arc<S>, denominations: Denominations) -> Self {
        Self {
            device_id,
            store,
            denominations,
            ttl: PENDING_COIN_TTL,
        }
    }

    pub fn from_config(device_id: DeviceId, store: Arc<S>, config: &KioskConfig) -> Self {
        Self::new(device_id, store, config.accepted_denominations.clone())
            .with_ttl(config.pending_coin_ttl)
    }

    /// Lifetime of the total, counted from the first coin after a claim.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn denominations(&self) -> &Denominations {
        &self.denominations
    }

    /// Bank one coin and return the new pending total.
    ///
    /// # Errors
    ///
    /// `InvalidDenomination` if `amount` is not an accepted coin; nothing is
    /// banked in that case. `Core` if the store fails.
    pub async fn deposit(&self, amount: Decimal) -> PaymentResult<Decimal> {
        if !self.denominations.contains(amount) {
            return Err(PaymentError::InvalidDenomination {
                value: amount,
                accepted: self.denominations.to_string(),
            });
        }

        self.reap_expired().await?;
        let total = self.store.increment(&self.key(), amount, self.ttl).await?;
        debug!(device_id = %self.device_id, %amount, %total, "Coin banked");
        Ok(total)
    }

    /// Put back a claimed total that could not be credited.
    pub(crate) async fn restore(&self, amount: Decimal) -> PaymentResult<Decimal> {
        Ok(self.store.increment(&self.key(), amount, self.ttl).await?)
    }

    /// Total currently waiting to be claimed.
    pub async fn pending_total(&self) -> PaymentResult<Decimal> {
        Ok(self
            .store
            .get(&self.key())
            .await?
            .and_then(|value| value.as_amount())
            .unwrap_or(Decimal::ZERO))
    }

    /// Take the whole pending total, leaving nothing behind.
    pub async fn claim(&self) -> PaymentResult<Option<Decimal>> {
        self.reap_expired().await?;
        let Some(value) = self.store.take(&self.key()).await? else {
            return Ok(None);
        };

        match value.as_amount() {
            Some(total) if total > Decimal::ZERO => Ok(Some(total)),
            Some(_) => Ok(None),
            None => {
                warn!(device_id = %self.device_id, "Discarding non-amount pending coin entry");
                Ok(None)
            }
        }
    }

    /// Drop a total whose TTL ran out before anyone claimed it.
    ///
    /// Returns the amount that was lost, if any.
    pub async fn reap_expired(&self) -> PaymentResult<Option<Decimal>> {
        let lost = self
            .store
            .take_expired(&self.key())
            .await?
            .and_then(|value| value.as_amount())
            .filter(|amount| *amount > Decimal::ZERO);

        if let Some(amount) = lost {
            warn!(
                device_id = %self.device_id,
                %amount,
                ttl = ?self.ttl,
                "Pending coins expired unclaimed"
            );
        }
        Ok(lost)
    }

    fn key(&self) -> String {
        format!("coinbox.{}.pending_coins", self.device_id)
    }
}

impl<S> Clone for PendingCoinBox<S> {
    fn clone(&self) -> Self {
        Self {
            device_id: self.device_id.clone(),
            store: Arc::clone(&self.store),
            denominations: self.denominations.clone(),
            ttl: self.ttl,
        }
    }
}

impl<S> std::fmt::Debug for PendingCoinBox<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCoinBox")
            .field("device_id", &self.device_id)
            .field("denominations", &self.denominations)
            .field("ttl", &self.ttl)
            .finish()
    }
}
