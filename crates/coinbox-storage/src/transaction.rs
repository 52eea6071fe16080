//! Transaction-scoped ledger operations.
//!
//! These functions take an open SQLite transaction so a balance change and
//! its ledger entry commit or roll back together. They are the only code
//! that writes `users.balance_cents` or inserts into `ledger_entries`.
//!
//! # Locking
//!
//! SQLite has no `SELECT ... FOR UPDATE`. [`lock_user_balance`] makes the
//! balance read a write (`UPDATE ... RETURNING`), which takes the database
//! write lock before anything is read. A second writer for any user waits
//! on the busy timeout until the first transaction ends, so two
//! read-modify-write sequences never interleave.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use coinbox_storage::{Database, EntryDetails, EntryType, transaction};
//!
//! # async fn example(db: &Database) -> coinbox_storage::StorageResult<()> {
//! let mut tx = db.pool().begin().await?;
//!
//! let before = transaction::lock_user_balance(&mut tx, 1).await?;
//! let after = before + 500;
//! transaction::set_user_balance(&mut tx, 1, after).await?;
//! transaction::insert_ledger_entry(
//!     &mut tx,
//!     &transaction::NewLedgerEntry {
//!         user_id: 1,
//!         entry_type: EntryType::CoinInsert,
//!         amount_cents: 500,
//!         balance_before_cents: before,
//!         balance_after_cents: after,
//!         description: "Coin",
//!         details: &EntryDetails::new(),
//!     },
//! )
//! .await?;
//!
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{StorageError, StorageResult};
use crate::models::{EntryDetails, EntryType, LedgerEntry};
use crate::money::to_cents;
use chrono::Utc;
use coinbox_core::UserId;
use sqlx::{Sqlite, Transaction};

/// Row to append to the ledger.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry<'a> {
    pub user_id: UserId,
    pub entry_type: EntryType,
    pub amount_cents: i64,
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
    pub description: &'a str,
    pub details: &'a EntryDetails,
}

/// Take the write lock on `user_id` and return its balance in cents.
///
/// # Errors
///
/// Returns `StorageError::NotFound` if the user does not exist.
pub async fn lock_user_balance(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: UserId,
) -> StorageResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE users
        SET updated_at = ?
        WHERE id = ?
        RETURNING balance_cents
        "#,
    )
    .bind(Utc::now())
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(|(cents,)| cents)
        .ok_or_else(|| StorageError::user_not_found(user_id))
}

/// Overwrite the cached balance of a user locked in this transaction.
pub async fn set_user_balance(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: UserId,
    balance_cents: i64,
) -> StorageResult<()> {
    let result = sqlx::query("UPDATE users SET balance_cents = ? WHERE id = ?")
        .bind(balance_cents)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::user_not_found(user_id));
    }

    Ok(())
}

/// Append a ledger entry and return it as stored.
pub async fn insert_ledger_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &NewLedgerEntry<'_>,
) -> StorageResult<LedgerEntry> {
    let coin_value_cents = entry.details.coin_value.map(to_cents).transpose()?;

    let stored = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO ledger_entries (
            user_id, entry_type, amount_cents,
            balance_before_cents, balance_after_cents,
            print_job_id, coin_value_cents, coin_count,
            description, session_id, device_id, is_verified, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
        RETURNING *
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.entry_type)
    .bind(entry.amount_cents)
    .bind(entry.balance_before_cents)
    .bind(entry.balance_after_cents)
    .bind(entry.details.print_job_id)
    .bind(coin_value_cents)
    .bind(entry.details.coin_count)
    .bind(entry.description)
    .bind(entry.details.session_id.as_ref().map(|s| s.as_str()))
    .bind(entry.details.device_id.as_ref().map(|d| d.as_str()))
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await?;

    Ok(stored)
}
