#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::LedgerEntry;
use crate::money::from_cents;
use coinbox_core::{SessionId, UserId};
use rust_decimal::Decimal;
use sqlx::SqlitePool;

/// Read access to the append-only ledger.
///
/// Entries are only ever written by the credit ledger inside a balance
/// transaction, so this trait has no insert or update methods.
pub trait LedgerEntryRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<LedgerEntry>>;

    /// Most recent entries for a user, newest first
    async fn history(&self, user_id: UserId, limit: i64) -> StorageResult<Vec<LedgerEntry>>;

    /// Most recent coin insertions recorded for one web session, newest first
    async fn session_coin_insertions(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        limit: i64,
    ) -> StorageResult<Vec<LedgerEntry>>;

    /// Signed sum of all entries for a user (credits minus deductions)
    async fn signed_sum(&self, user_id: UserId) -> StorageResult<Decimal>;

    async fn count_for_user(&self, user_id: UserId) -> StorageResult<i64>;
}

pub struct SqliteLedgerEntryRepository {
    pool: SqlitePool,
}

impl SqliteLedgerEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl LedgerEntryRepository for SqliteLedgerEntryRepository {
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>("SELECT * FROM ledger_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    async fn history(&self, user_id: UserId, limit: i64) -> StorageResult<Vec<LedgerEntry>> {
        // Ids are monotonic and timestamps can tie, so order by id
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM ledger_entries
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn session_coin_insertions(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        limit: i64,
    ) -> StorageResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM ledger_entries
            WHERE user_id = ?
              AND session_id = ?
              AND entry_type = 'coin_insert'
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(session_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn signed_sum(&self, user_id: UserId) -> StorageResult<Decimal> {
        let (cents,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN entry_type = 'print_deduct' THEN -amount_cents ELSE amount_cents END
            ), 0)
            FROM ledger_entries
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(from_cents(cents))
    }

    async fn count_for_user(&self, user_id: UserId) -> StorageResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ledger_entries WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}
