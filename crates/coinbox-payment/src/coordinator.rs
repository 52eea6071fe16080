//! Binds web sessions to users and required amounts, and turns coins into
//! ledger credits for them.

use crate::error::{PaymentError, PaymentResult};
use crate::pending::PendingCoinBox;
use crate::printing::{JobHandle, PrintJobDescriptor, PrintSubmitter};
use crate::session::{PaymentSession, SessionState};
use coinbox_core::constants::DEFAULT_RECENT_COINS_LIMIT;
use coinbox_core::{Denominations, DeviceId, KeyValueStore, SessionId, UserId};
use coinbox_storage::{
    CreditLedger, Database, EntryDetails, LedgerEntry, SqliteUserRepository, StorageError,
    UserRepository,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// Snapshot served to the polling payment page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentStatus {
    pub session_id: SessionId,
    pub user_id: UserId,
    /// Last committed balance of the bound user.
    pub amount_paid: Decimal,
    pub amount_required: Decimal,
    pub is_complete: bool,
    pub state: SessionState,
    /// Latest coins credited in this session, newest first.
    pub recent_coins: Vec<LedgerEntry>,
}

/// Result of crediting a coin to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinReceipt {
    pub entry: LedgerEntry,
    pub balance: Decimal,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub handle: JobHandle,
    pub charge: LedgerEntry,
}

/// Payment sessions of one kiosk.
///
/// Sessions live in memory; balances live in the ledger. The coordinator
/// never changes a balance itself.
///
/// Each session has a credit gate. Crediting a coin, claiming pending coins,
/// cancelling and checking out all hold it for their whole ledger call, so
/// a credit can never land between a cancel's refund and the session being
/// discarded.
pub struct PaymentCoordinator {
    ledger: Arc<CreditLedger>,
    users: SqliteUserRepository,
    denominations: Denominations,
    sessions: Mutex<HashMap<SessionId, PaymentSession>>,
    credit_gates: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
}

impl PaymentCoordinator {
    pub fn new(db: &Database, ledger: Arc<CreditLedger>, denominations: Denominations) -> Self {
        Self {
            ledger,
            users: SqliteUserRepository::new(db.pool().clone()),
            denominations,
            sessions: Mutex::new(HashMap::new()),
            credit_gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn denominations(&self) -> &Denominations {
        &self.denominations
    }

    /// Open a payment session.
    ///
    /// Without a `user_id` the session pays as the guest user of
    /// `session_id`, created on first use. Credit the user already holds
    /// counts towards the required amount.
    ///
    /// # Errors
    ///
    /// - `SessionExists` if the session is already open
    /// - `InvalidAmount` if `required_amount` is not positive
    /// - `Storage(NotFound)` if `user_id` does not exist
    pub async fn start_session(
        &self,
        session_id: SessionId,
        user_id: Option<UserId>,
        required_amount: Decimal,
    ) -> PaymentResult<PaymentStatus> {
        if self.lock_sessions().contains_key(&session_id) {
            return Err(PaymentError::SessionExists(session_id));
        }

        let user_id = match user_id {
            Some(id) => {
                self.users
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| StorageError::user_not_found(id))?
                    .id
            }
            None => self.users.find_or_create_guest(&session_id).await?.id,
        };

        let mut session = PaymentSession::new(session_id.clone(), user_id, required_amount)?;
        session.apply_balance(self.ledger.balance(user_id).await?)?;

        match self.lock_sessions().entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(PaymentError::SessionExists(session_id)),
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }
        self.lock_gates()
            .insert(session_id.clone(), Arc::new(AsyncMutex::new(())));

        info!(session_id = %session_id, user_id, required = %required_amount, "Payment session started");
        self.status(&session_id).await
    }

    /// Copy of an open session.
    pub fn session(&self, session_id: &SessionId) -> Option<PaymentSession> {
        self.lock_sessions().get(session_id).cloned()
    }

    pub fn active_sessions(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Credit one coin to the session's user.
    ///
    /// `coin_value` is the physical coin when it differs from the credited
    /// amount; the whitelist check applies to it, or to `amount` when absent.
    ///
    /// # Errors
    ///
    /// - `InvalidDenomination` if the coin is not accepted; nothing is credited
    /// - `SessionNotFound` / `InvalidTransition` if the session is gone or
    ///   cancelled
    /// - `Storage` if the ledger rejects or fails the credit
    pub async fn record_coin_insertion(
        &self,
        session_id: &SessionId,
        amount: Decimal,
        coin_value: Option<Decimal>,
        device_id: Option<DeviceId>,
    ) -> PaymentResult<CoinReceipt> {
        let coin = coin_value.unwrap_or(amount);
        if !self.denominations.contains(coin) {
            warn!(session_id = %session_id, %coin, accepted = %self.denominations, "Coin rejected");
            return Err(PaymentError::InvalidDenomination {
                value: coin,
                accepted: self.denominations.to_string(),
            });
        }

        let gate = self.credit_gate(session_id)?;
        let _credit = gate.lock().await;

        let user_id = self.accepting_user(session_id)?;
        let mut details = EntryDetails::new().coin(coin).session(session_id.clone());
        if let Some(device_id) = device_id {
            details = details.device(device_id);
        }

        let entry = self
            .ledger
            .add_credits(user_id, amount, &format!("Coin inserted: {coin}"), details)
            .await?;

        Ok(self.receipt(session_id, entry))
    }

    /// Credit everything banked in `pending` to this session.
    ///
    /// Returns `None` when nothing was pending. A total that cannot be
    /// credited is put back for the next claim.
    pub async fn claim_pending_coins<S: KeyValueStore>(
        &self,
        session_id: &SessionId,
        pending: &PendingCoinBox<S>,
    ) -> PaymentResult<Option<CoinReceipt>> {
        let gate = self.credit_gate(session_id)?;
        let _credit = gate.lock().await;

        // Leave the coins banked for a session that can take them
        let user_id = self.accepting_user(session_id)?;

        let Some(total) = pending.claim().await? else {
            return Ok(None);
        };

        info!(session_id = %session_id, device_id = %pending.device_id(), %total, "Claiming pending coins");

        let details = EntryDetails::new()
            .session(session_id.clone())
            .device(pending.device_id().clone());
        let description = format!("Coins from device {}", pending.device_id());

        match self
            .ledger
            .add_credits(user_id, total, &description, details)
            .await
        {
            Ok(entry) => Ok(Some(self.receipt(session_id, entry))),
            Err(e) => {
                if let Err(restore) = pending.restore(total).await {
                    error!(
                        device_id = %pending.device_id(),
                        %total,
                        error = %restore,
                        "Claimed coins could be neither credited nor restored"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Current payment status from the committed balance.
    pub async fn status(&self, session_id: &SessionId) -> PaymentResult<PaymentStatus> {
        let session = self
            .session(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.clone()))?;
        let user_id = session.user_id();

        let balance = self.ledger.balance(user_id).await?;
        let state = self.advance(session_id, balance).unwrap_or(session.state());
        let recent_coins = self
            .ledger
            .session_coin_insertions(user_id, session_id, DEFAULT_RECENT_COINS_LIMIT)
            .await?;

        Ok(PaymentStatus {
            session_id: session_id.clone(),
            user_id,
            amount_paid: balance,
            amount_required: session.required_amount(),
            is_complete: state == SessionState::Complete,
            state,
            recent_coins,
        })
    }

    /// Claim pending device coins, then report status.
    pub async fn poll_status<S: KeyValueStore>(
        &self,
        session_id: &SessionId,
        pending: &PendingCoinBox<S>,
    ) -> PaymentResult<PaymentStatus> {
        self.claim_pending_coins(session_id, pending).await?;
        self.status(session_id).await
    }

    /// Refund the session's user to zero and discard the session.
    ///
    /// Returns the deduction entry, or `None` when the balance was already
    /// zero or the session no longer exists. Calling it twice is safe.
    ///
    /// # Errors
    ///
    /// `Storage` if the deduction does not commit; the session is kept so
    /// the cancel can be retried.
    pub async fn cancel(&self, session_id: &SessionId) -> PaymentResult<Option<LedgerEntry>> {
        let Ok(gate) = self.credit_gate(session_id) else {
            debug!(session_id = %session_id, "Cancel for unknown session ignored");
            return Ok(None);
        };
        let _credit = gate.lock().await;

        let (user_id, previous) = {
            let mut sessions = self.lock_sessions();
            let Some(session) = sessions.get_mut(session_id) else {
                debug!(session_id = %session_id, "Cancel for unknown session ignored");
                return Ok(None);
            };

            let previous = session.state();
            // A complete session is destroyed without passing through Cancelled
            if previous != SessionState::Complete {
                session.cancel()?;
            }
            (session.user_id(), previous)
        };

        let details = EntryDetails::new().session(session_id.clone());
        match self
            .ledger
            .drain_balance(user_id, "Payment cancelled", details)
            .await
        {
            Ok(entry) => {
                self.discard(session_id);
                info!(
                    session_id = %session_id,
                    user_id,
                    refunded = %entry.as_ref().map_or(Decimal::ZERO, |e| e.amount),
                    "Payment session cancelled"
                );
                Ok(entry)
            }
            Err(e) => {
                if let Some(session) = self.lock_sessions().get_mut(session_id) {
                    session.restore_state(previous);
                }
                error!(session_id = %session_id, user_id, error = %e, "Cancel refund failed");
                Err(e.into())
            }
        }
    }

    /// Charge a complete session for `job` and submit it.
    ///
    /// If submission fails the charge is refunded and the session stays
    /// open and complete. On success the session is destroyed; any credit
    /// beyond the job cost stays on the user's account.
    ///
    /// # Errors
    ///
    /// - `PaymentIncomplete` if the session has not reached its amount
    /// - `Storage` if the charge or the refund does not commit
    /// - the submitter's error if the job was rejected
    pub async fn checkout<P: PrintSubmitter>(
        &self,
        session_id: &SessionId,
        job: &PrintJobDescriptor,
        printer: &P,
    ) -> PaymentResult<CheckoutReceipt> {
        let gate = self.credit_gate(session_id)?;
        let _credit = gate.lock().await;

        // Held outside the map until done so a second checkout cannot charge twice
        let session = self
            .lock_sessions()
            .remove(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.clone()))?;
        let user_id = session.user_id();

        if !session.is_complete() {
            let required = session.required_amount();
            self.reinsert(session);
            let paid = self.ledger.balance(user_id).await?;
            return Err(PaymentError::PaymentIncomplete { paid, required });
        }

        let details = EntryDetails::new()
            .print_job(job.job_id)
            .session(session_id.clone());

        let charge = match self
            .ledger
            .deduct_credits(user_id, job.cost, &format!("Print job #{}", job.job_id), details.clone())
            .await
        {
            Ok(charge) => charge,
            Err(e) => {
                self.reinsert(session);
                return Err(e.into());
            }
        };

        match printer.submit(job).await {
            Ok(handle) => {
                self.lock_gates().remove(session_id);
                info!(
                    session_id = %session_id,
                    user_id,
                    job_id = job.job_id,
                    handle = %handle,
                    cost = %job.cost,
                    "Print job submitted"
                );
                Ok(CheckoutReceipt { handle, charge })
            }
            Err(submit_error) => {
                warn!(job_id = job.job_id, error = %submit_error, "Print submission failed, refunding");

                let refund = self
                    .ledger
                    .refund(
                        user_id,
                        job.cost,
                        &format!("Refund for print job #{}", job.job_id),
                        details,
                    )
                    .await;
                self.reinsert(session);

                match refund {
                    Ok(_) => Err(submit_error),
                    Err(e) => {
                        error!(job_id = job.job_id, user_id, error = %e, "Refund after failed submission did not commit");
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// User of a session that may still receive credit.
    fn accepting_user(&self, session_id: &SessionId) -> PaymentResult<UserId> {
        let sessions = self.lock_sessions();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.clone()))?;

        if session.state() == SessionState::Cancelled {
            return Err(PaymentError::InvalidTransition {
                session_id: session_id.clone(),
                state: SessionState::Cancelled,
                action: "accept credit",
            });
        }

        Ok(session.user_id())
    }

    fn receipt(&self, session_id: &SessionId, entry: LedgerEntry) -> CoinReceipt {
        let balance = entry.balance_after;
        let is_complete = self.advance(session_id, balance) == Some(SessionState::Complete);

        CoinReceipt {
            entry,
            balance,
            is_complete,
        }
    }

    /// Move a session forward to a committed balance. `None` if the session
    /// went away or was cancelled meanwhile.
    fn advance(&self, session_id: &SessionId, balance: Decimal) -> Option<SessionState> {
        let mut sessions = self.lock_sessions();
        let session = sessions.get_mut(session_id)?;

        match session.apply_balance(balance) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Session state left unchanged");
                None
            }
        }
    }

    /// Gate of an open session.
    fn credit_gate(&self, session_id: &SessionId) -> PaymentResult<Arc<AsyncMutex<()>>> {
        self.lock_gates()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.clone()))
    }

    fn discard(&self, session_id: &SessionId) {
        self.lock_sessions().remove(session_id);
        self.lock_gates().remove(session_id);
    }

    fn reinsert(&self, session: PaymentSession) {
        self.lock_sessions()
            .insert(session.session_id().clone(), session);
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<SessionId, PaymentSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_gates(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<AsyncMutex<()>>>> {
        self.credit_gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
