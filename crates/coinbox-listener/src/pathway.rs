//! Where a coin reported by the device ends up.

use coinbox_core::{DeviceId, KeyValueStore, SessionId};
use coinbox_payment::{PaymentCoordinator, PaymentError, PaymentResult, PendingCoinBox};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Web session currently bound to the device, shared with the front end.
#[derive(Debug, Clone, Default)]
pub struct ActiveSession(Arc<Mutex<Option<SessionId>>>);

impl ActiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, session_id: SessionId) {
        *self.lock() = Some(session_id);
    }

    pub fn release(&self) -> Option<SessionId> {
        self.lock().take()
    }

    pub fn current(&self) -> Option<SessionId> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionId>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What happened to an accepted coin.
#[derive(Debug, Clone, PartialEq)]
pub enum CoinOutcome {
    /// Waiting in the pending box; `total` is everything banked so far.
    Banked { total: Decimal },

    /// Credited to a session's user.
    Credited { balance: Decimal, is_complete: bool },
}

pub enum CreditPathway<S> {
    /// Bank coins under the device id until a status poll claims them.
    DeviceScoped(PendingCoinBox<S>),

    /// Credit coins straight to the session bound to the device.
    SessionScoped {
        coordinator: Arc<PaymentCoordinator>,
        session: ActiveSession,
    },
}

impl<S: KeyValueStore> CreditPathway<S> {
    /// Route one coin.
    ///
    /// # Errors
    ///
    /// Business rejections (`InvalidDenomination`, `NoActiveSession`, a
    /// cancelled session) and ledger failures, as returned by the payment
    /// layer.
    pub async fn accept_coin(
        &self,
        amount: Decimal,
        device_id: &DeviceId,
    ) -> PaymentResult<CoinOutcome> {
        match self {
            CreditPathway::DeviceScoped(pending) => {
                let total = pending.deposit(amount).await?;
                Ok(CoinOutcome::Banked { total })
            }
            CreditPathway::SessionScoped {
                coordinator,
                session,
            } => {
                let session_id = session.current().ok_or(PaymentError::NoActiveSession)?;
                let receipt = coordinator
                    .record_coin_insertion(&session_id, amount, Some(amount), Some(device_id.clone()))
                    .await?;
                Ok(CoinOutcome::Credited {
                    balance: receipt.balance,
                    is_complete: receipt.is_complete,
                })
            }
        }
    }

    /// Drop a banked total nobody claimed in time. Failures are only
    /// logged; the next tick tries again.
    pub async fn reap_expired(&self) {
        if let CreditPathway::DeviceScoped(pending) = self
            && let Err(e) = pending.reap_expired().await
        {
            warn!(device_id = %pending.device_id(), error = %e, "Pending coin expiry check failed");
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CreditPathway::DeviceScoped(_) => "device",
            CreditPathway::SessionScoped { .. } => "session",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinbox_core::{Denominations, MemoryStore};
    use std::time::Duration;

    #[test]
    fn test_active_session_bind_release() {
        let active = ActiveSession::new();
        let shared = active.clone();
        assert!(active.current().is_none());

        active.bind(SessionId::new("s1").unwrap());
        assert_eq!(shared.current().unwrap().as_str(), "s1");

        assert_eq!(shared.release().unwrap().as_str(), "s1");
        assert!(active.current().is_none());
    }

    #[tokio::test]
    async fn test_device_scoped_banks_coin() {
        let device = DeviceId::new("ESP32_COIN_001").unwrap();
        let pending = PendingCoinBox::new(
            device.clone(),
            Arc::new(MemoryStore::new()),
            Denominations::default(),
        );
        let pathway = CreditPathway::DeviceScoped(pending.clone());

        let outcome = pathway.accept_coin(Decimal::from(10), &device).await.unwrap();

        assert_eq!(outcome, CoinOutcome::Banked { total: Decimal::from(10) });
        assert_eq!(pending.pending_total().await.unwrap(), Decimal::from(10));
        assert_eq!(pathway.name(), "device");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_drops_expired_total() {
        let device = DeviceId::new("ESP32_COIN_001").unwrap();
        let pending = PendingCoinBox::new(
            device.clone(),
            Arc::new(MemoryStore::new()),
            Denominations::default(),
        )
        .with_ttl(Duration::from_secs(60));
        let pathway = CreditPathway::DeviceScoped(pending.clone());
        pathway.accept_coin(Decimal::from(5), &device).await.unwrap();

        pathway.reap_expired().await;
        assert_eq!(pending.pending_total().await.unwrap(), Decimal::from(5));

        tokio::time::advance(Duration::from_secs(61)).await;
        pathway.reap_expired().await;

        assert_eq!(pending.reap_expired().await.unwrap(), None);
        assert_eq!(pending.claim().await.unwrap(), None);
    }
}
