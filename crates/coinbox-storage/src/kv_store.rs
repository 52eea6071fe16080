//! [`KeyValueStore`] on the ledger database.
//!
//! Entries live in `kv_entries`, so every process that opens the same
//! database file sees the same health records and pending coin totals.
//! Expiry is wall-clock time in Unix milliseconds.
//!
//! # Examples
//!
//! ```no_run
//! use coinbox_core::{KeyValueStore, StoreValue};
//! use coinbox_storage::{Database, DatabaseConfig, SqliteStore};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("coinbox.db")).await?;
//! let store = SqliteStore::new(&db);
//!
//! store
//!     .put("coinbox.A.status", StoreValue::Text("READY".into()), Duration::from_secs(300))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::Database;
use crate::error::StorageResult;
use chrono::{DateTime, SecondsFormat, Utc};
use coinbox_core::{Error, KeyValueStore, Result, StoreValue};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Delete every expired entry and return how many were removed.
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        let removed = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?
            .rows_affected();

        debug!(removed, "Expired store entries purged");
        Ok(removed)
    }
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<StoreValue>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT kind, value FROM kv_entries WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now_millis())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        row.map(|(kind, value)| decode(key, &kind, &value))
            .transpose()
    }

    async fn put(&self, key: &str, value: StoreValue, ttl: Duration) -> Result<()> {
        let (kind, text) = encode(&value);

        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, kind, value, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (key) DO UPDATE
            SET kind = excluded.kind, value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(kind)
        .bind(text)
        .bind(expiry(now_millis(), ttl))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn increment(&self, key: &str, by: Decimal, ttl: Duration) -> Result<Decimal> {
        let now = now_millis();
        let fresh_expiry = expiry(now, ttl);
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Write first so the read below happens under the write lock
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, kind, value, expires_at)
            VALUES (?, 'amount', '0', ?)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(fresh_expiry)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let (kind, value, expires_at): (String, String, i64) =
            sqlx::query_as("SELECT kind, value, expires_at FROM kv_entries WHERE key = ?")
                .bind(key)
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;

        let (total, expires_at) = if expires_at <= now {
            (by, fresh_expiry)
        } else {
            match decode(key, &kind, &value)? {
                StoreValue::Amount(current) => {
                    let total = current.checked_add(by).ok_or_else(|| {
                        Error::InvalidAmount(format!("Total for {key} is out of range"))
                    })?;
                    (total, expires_at)
                }
                _ => {
                    return Err(Error::StoreTypeMismatch {
                        key: key.to_string(),
                        expected: "an amount",
                    });
                }
            }
        };

        sqlx::query("UPDATE kv_entries SET kind = 'amount', value = ?, expires_at = ? WHERE key = ?")
            .bind(total.to_string())
            .bind(expires_at)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(total)
    }

    async fn take(&self, key: &str) -> Result<Option<StoreValue>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "DELETE FROM kv_entries WHERE key = ? RETURNING kind, value, expires_at",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let now = now_millis();
        row.filter(|(_, _, expires_at)| *expires_at > now)
            .map(|(kind, value, _)| decode(key, &kind, &value))
            .transpose()
    }

    async fn take_expired(&self, key: &str) -> Result<Option<StoreValue>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "DELETE FROM kv_entries WHERE key = ? AND expires_at <= ? RETURNING kind, value",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|(kind, value)| decode(key, &kind, &value))
            .transpose()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

fn encode(value: &StoreValue) -> (&'static str, String) {
    match value {
        StoreValue::Timestamp(at) => ("timestamp", at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        StoreValue::Text(text) => ("text", text.clone()),
        StoreValue::Amount(amount) => ("amount", amount.to_string()),
    }
}

fn decode(key: &str, kind: &str, value: &str) -> Result<StoreValue> {
    let corrupt = |reason: String| Error::StoreBackend(format!("Entry {key}: {reason}"));

    match kind {
        "timestamp" => DateTime::parse_from_rfc3339(value)
            .map(|at| StoreValue::Timestamp(at.with_timezone(&Utc)))
            .map_err(|e| corrupt(e.to_string())),
        "text" => Ok(StoreValue::Text(value.to_string())),
        "amount" => Decimal::from_str(value)
            .map(StoreValue::Amount)
            .map_err(|e| corrupt(e.to_string())),
        other => Err(corrupt(format!("unknown kind {other}"))),
    }
}

fn backend(e: sqlx::Error) -> Error {
    Error::StoreBackend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    async fn store() -> (Database, SqliteStore) {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteStore::new(&db);
        (db, store)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_forget() {
        let (_db, store) = store().await;
        let now = Utc::now();

        store.put("hb", StoreValue::Timestamp(now), TTL).await.unwrap();
        store.put("status", StoreValue::Text("READY".into()), TTL).await.unwrap();

        assert_eq!(store.get("hb").await.unwrap(), Some(StoreValue::Timestamp(now)));
        assert_eq!(
            store.get("status").await.unwrap(),
            Some(StoreValue::Text("READY".to_string()))
        );

        store.forget("hb").await.unwrap();
        assert!(store.get("hb").await.unwrap().is_none());
        store.forget("hb").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_replaces_kind_and_value() {
        let (_db, store) = store().await;
        store.put("k", StoreValue::Text("x".into()), TTL).await.unwrap();
        store.put("k", StoreValue::Amount(dec("2.50")), TTL).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(StoreValue::Amount(dec("2.50"))));
    }

    #[tokio::test]
    async fn test_increment_accumulates_exactly() {
        let (_db, store) = store().await;

        assert_eq!(store.increment("coins", dec("5"), TTL).await.unwrap(), dec("5"));
        assert_eq!(store.increment("coins", dec("0.10"), TTL).await.unwrap(), dec("5.10"));
        assert_eq!(store.increment("coins", dec("0.20"), TTL).await.unwrap(), dec("5.30"));

        assert_eq!(
            store.take("coins").await.unwrap(),
            Some(StoreValue::Amount(dec("5.30")))
        );
        assert!(store.take("coins").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_type_mismatch_leaves_entry() {
        let (_db, store) = store().await;
        store.put("k", StoreValue::Text("x".into()), TTL).await.unwrap();

        let err = store.increment("k", Decimal::ONE, TTL).await.unwrap_err();

        assert!(matches!(err, Error::StoreTypeMismatch { .. }));
        assert_eq!(store.get("k").await.unwrap(), Some(StoreValue::Text("x".into())));
    }

    #[tokio::test]
    async fn test_expired_entry_restarts_increment() {
        let (_db, store) = store().await;
        store.increment("coins", dec("20"), Duration::ZERO).await.unwrap();

        assert!(store.get("coins").await.unwrap().is_none());
        assert_eq!(store.increment("coins", dec("1"), TTL).await.unwrap(), dec("1"));
        assert!(store.take_expired("coins").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_expired_returns_dead_entry_once() {
        let (_db, store) = store().await;
        store.increment("coins", dec("5"), TTL).await.unwrap();
        store.increment("stale", dec("10"), Duration::ZERO).await.unwrap();

        assert!(store.take_expired("coins").await.unwrap().is_none());
        assert_eq!(
            store.take_expired("stale").await.unwrap(),
            Some(StoreValue::Amount(dec("10")))
        );
        assert!(store.take_expired("stale").await.unwrap().is_none());
        assert!(store.get("coins").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_take_skips_expired_entry() {
        let (_db, store) = store().await;
        store.put("k", StoreValue::Text("x".into()), Duration::ZERO).await.unwrap();

        assert!(store.take("k").await.unwrap().is_none());
        assert!(store.take_expired("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (_db, store) = store().await;
        store.put("a", StoreValue::Text("1".into()), Duration::ZERO).await.unwrap();
        store.put("b", StoreValue::Text("2".into()), TTL).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_closed_database_is_backend_error() {
        let (db, store) = store().await;
        db.close().await;

        let err = store.get("k").await.unwrap_err();

        assert!(matches!(err, Error::StoreBackend(_)));
        assert_eq!(err.kind(), coinbox_core::ErrorKind::PersistenceFailure);
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(matches!(
            decode("k", "blob", "x"),
            Err(Error::StoreBackend(_))
        ));
        assert!(matches!(
            decode("k", "amount", "five"),
            Err(Error::StoreBackend(_))
        ));
    }
}
