//! The credit ledger: the only writer of user balances.
//!
//! Every mutation runs as one SQLite transaction that locks the user row,
//! checks the new balance, writes the cached balance and appends exactly
//! one ledger entry. Lock contention (`SQLITE_BUSY`/`SQLITE_LOCKED`, or no
//! pooled connection in time) is retried up to
//! [`LedgerConfig::max_attempts`]; any other failure surfaces to the caller
//! unchanged.

use crate::connection::Database;
use crate::error::{StorageError, StorageResult};
use crate::models::{EntryDetails, EntryType, LedgerEntry};
use crate::money::{from_cents, positive_cents};
use crate::repositories::{LedgerEntryRepository, SqliteLedgerEntryRepository};
use crate::transaction::{self, NewLedgerEntry};
use coinbox_core::{SessionId, UserId};
use rust_decimal::Decimal;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Upper bound on one attempt, from the first statement to just
    /// before commit.
    pub transaction_timeout: Duration,

    /// Attempts made when the database is locked by another writer.
    pub max_attempts: u32,

    /// Base delay between attempts; grows linearly with the attempt number.
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl LedgerConfig {
    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Apply { entry_type: EntryType, cents: i64 },
    /// Deduct whatever the locked balance is; nothing if it is zero.
    Drain,
}

/// Transactional balance store for kiosk users.
///
/// # Examples
///
/// ```no_run
/// use coinbox_storage::{CreditLedger, Database, EntryDetails};
/// use rust_decimal::Decimal;
///
/// # async fn example() -> coinbox_storage::StorageResult<()> {
/// let db = Database::in_memory().await?;
/// let ledger = CreditLedger::new(&db);
///
/// let entry = ledger
///     .add_credits(1, Decimal::new(500, 2), "Coin", EntryDetails::new())
///     .await?;
/// assert_eq!(entry.balance_after, Decimal::new(500, 2));
/// # Ok(())
/// # }
/// ```
pub struct CreditLedger {
    pool: SqlitePool,
    entries: SqliteLedgerEntryRepository,
    config: LedgerConfig,
}

impl CreditLedger {
    pub fn new(db: &Database) -> Self {
        Self::with_config(db, LedgerConfig::default())
    }

    pub fn with_config(db: &Database, config: LedgerConfig) -> Self {
        Self {
            pool: db.pool().clone(),
            entries: SqliteLedgerEntryRepository::new(db.pool().clone()),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Record a positive entry of `entry_type`.
    ///
    /// # Errors
    ///
    /// - `Validation` if `entry_type` is a deduction, or `amount` is not
    ///   positive or has sub-cent precision
    /// - `NotFound` if the user does not exist
    /// - `Database`/`Timeout` if the transaction could not commit
    pub async fn credit(
        &self,
        user_id: UserId,
        entry_type: EntryType,
        amount: Decimal,
        description: &str,
        details: EntryDetails,
    ) -> StorageResult<LedgerEntry> {
        if !entry_type.is_credit() {
            return Err(StorageError::Validation(format!(
                "{entry_type} is not a credit entry type"
            )));
        }

        let cents = positive_cents(amount)?;
        self.mutate(user_id, Mutation::Apply { entry_type, cents }, description, &details)
            .await?
            .ok_or_else(|| StorageError::user_not_found(user_id))
    }

    /// Credit inserted coins (`coin_insert`).
    pub async fn add_credits(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
        details: EntryDetails,
    ) -> StorageResult<LedgerEntry> {
        self.credit(user_id, EntryType::CoinInsert, amount, description, details)
            .await
    }

    /// Operator top-up (`admin_add`).
    pub async fn admin_add_credits(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> StorageResult<LedgerEntry> {
        self.credit(
            user_id,
            EntryType::AdminAdd,
            amount,
            description,
            EntryDetails::new(),
        )
        .await
    }

    pub async fn refund(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
        details: EntryDetails,
    ) -> StorageResult<LedgerEntry> {
        self.credit(user_id, EntryType::Refund, amount, description, details)
            .await
    }

    /// Deduct `amount` for printing (`print_deduct`).
    ///
    /// The balance is checked inside the transaction, after the row lock
    /// is held; a failed deduction changes nothing.
    ///
    /// # Errors
    ///
    /// `InsufficientBalance` if the balance is below `amount`, plus the
    /// errors of [`credit`](Self::credit).
    pub async fn deduct_credits(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: &str,
        details: EntryDetails,
    ) -> StorageResult<LedgerEntry> {
        let cents = positive_cents(amount)?;
        let mutation = Mutation::Apply {
            entry_type: EntryType::PrintDeduct,
            cents,
        };

        self.mutate(user_id, mutation, description, &details)
            .await?
            .ok_or_else(|| StorageError::user_not_found(user_id))
    }

    /// Deduct the whole balance in one transaction.
    ///
    /// Returns `None` without writing an entry when the balance is already
    /// zero.
    pub async fn drain_balance(
        &self,
        user_id: UserId,
        description: &str,
        details: EntryDetails,
    ) -> StorageResult<Option<LedgerEntry>> {
        self.mutate(user_id, Mutation::Drain, description, &details)
            .await
    }

    /// Last committed balance.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist.
    pub async fn balance(&self, user_id: UserId) -> StorageResult<Decimal> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance_cents FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(cents,)| from_cents(cents))
            .ok_or_else(|| StorageError::user_not_found(user_id))
    }

    /// Whether the last committed balance covers `amount`.
    ///
    /// Not a reservation: a later deduction re-checks under its own lock.
    /// Unknown users have no balance and yield `false`.
    pub async fn has_sufficient_balance(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> StorageResult<bool> {
        match self.balance(user_id).await {
            Ok(balance) => Ok(balance >= amount),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn transaction_history(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> StorageResult<Vec<LedgerEntry>> {
        self.entries.history(user_id, limit).await
    }

    pub async fn session_coin_insertions(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        limit: i64,
    ) -> StorageResult<Vec<LedgerEntry>> {
        self.entries
            .session_coin_insertions(user_id, session_id, limit)
            .await
    }

    /// Signed sum of every entry recorded for the user.
    pub async fn ledger_sum(&self, user_id: UserId) -> StorageResult<Decimal> {
        self.entries.signed_sum(user_id).await
    }

    /// Whether the cached balance equals the ledger sum.
    pub async fn verify_balance(&self, user_id: UserId) -> StorageResult<bool> {
        let balance = self.balance(user_id).await?;
        let sum = self.ledger_sum(user_id).await?;

        if balance != sum {
            warn!(user_id, %balance, %sum, "Cached balance disagrees with ledger");
        }

        Ok(balance == sum)
    }

    async fn mutate(
        &self,
        user_id: UserId,
        mutation: Mutation,
        description: &str,
        details: &EntryDetails,
    ) -> StorageResult<Option<LedgerEntry>> {
        let mut attempt = 1;

        loop {
            match self.try_mutate(user_id, mutation, description, details).await {
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(user_id, attempt, error = %e, "Ledger database busy, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Ok(Some(entry)) => {
                    info!(
                        user_id,
                        entry_id = entry.id,
                        entry_type = %entry.entry_type,
                        amount = %entry.amount,
                        balance = %entry.balance_after,
                        "Ledger entry recorded"
                    );
                    return Ok(Some(entry));
                }
                result => return result,
            }
        }
    }

    /// One attempt. The timeout covers everything up to the commit; the
    /// commit itself is never abandoned halfway.
    async fn try_mutate(
        &self,
        user_id: UserId,
        mutation: Mutation,
        description: &str,
        details: &EntryDetails,
    ) -> StorageResult<Option<LedgerEntry>> {
        let mut tx = self.pool.begin().await?;

        let applied = tokio::time::timeout(
            self.config.transaction_timeout,
            apply(&mut tx, user_id, mutation, description, details),
        )
        .await
        .map_err(|_| StorageError::Timeout(self.config.transaction_timeout))??;

        tx.commit().await?;
        Ok(applied)
    }
}

async fn apply(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: UserId,
    mutation: Mutation,
    description: &str,
    details: &EntryDetails,
) -> StorageResult<Option<LedgerEntry>> {
    let before = transaction::lock_user_balance(tx, user_id).await?;

    let (entry_type, cents) = match mutation {
        Mutation::Apply { entry_type, cents } => (entry_type, cents),
        Mutation::Drain if before == 0 => {
            debug!(user_id, "Balance already zero, nothing to drain");
            return Ok(None);
        }
        Mutation::Drain => (EntryType::PrintDeduct, before),
    };

    let after = entry_type.apply_cents(before, cents).ok_or_else(|| {
        if entry_type.is_credit() {
            StorageError::Validation(format!("Balance of user {user_id} would overflow"))
        } else {
            StorageError::InsufficientBalance {
                requested: from_cents(cents),
                available: from_cents(before),
            }
        }
    })?;

    transaction::set_user_balance(tx, user_id, after).await?;
    let entry = transaction::insert_ledger_entry(
        tx,
        &NewLedgerEntry {
            user_id,
            entry_type,
            amount_cents: cents,
            balance_before_cents: before,
            balance_after_cents: after,
            description,
            details,
        },
    )
    .await?;

    Ok(Some(entry))
}
