#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{NewUser, User};
use coinbox_core::{SessionId, UserId};
use sqlx::SqlitePool;

/// Repository trait for kiosk users.
///
/// Balances are read here but never written; see
/// [`CreditLedger`](crate::CreditLedger).
pub trait UserRepository: Send + Sync {
    /// Create a user with a zero balance and return its id
    async fn create(&self, user: &NewUser) -> StorageResult<UserId>;

    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Find the guest user bound to a web session
    async fn find_by_session(&self, session_id: &SessionId) -> StorageResult<Option<User>>;

    /// Return the guest user for a session, creating it on first use.
    ///
    /// Safe to call concurrently for the same session; exactly one row is
    /// created.
    async fn find_or_create_guest(&self, session_id: &SessionId) -> StorageResult<User>;

    async fn find_all(&self) -> StorageResult<Vec<User>>;

    /// Delete a user. Fails for users with ledger history.
    async fn delete(&self, id: UserId) -> StorageResult<()>;
}

/// SQLite implementation of UserRepository
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &NewUser) -> StorageResult<UserId> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, session_id, is_guest)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&user.name)
        .bind(&user.session_id)
        .bind(user.is_guest)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, session_id, is_guest, balance_cents, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_session(&self, session_id: &SessionId) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, session_id, is_guest, balance_cents, created_at, updated_at
            FROM users
            WHERE session_id = ?
            "#,
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_or_create_guest(&self, session_id: &SessionId) -> StorageResult<User> {
        let guest = NewUser::guest(session_id);

        sqlx::query(
            r#"
            INSERT INTO users (name, session_id, is_guest)
            VALUES (?, ?, 1)
            ON CONFLICT(session_id) DO NOTHING
            "#,
        )
        .bind(&guest.name)
        .bind(&guest.session_id)
        .execute(&self.pool)
        .await?;

        self.find_by_session(session_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity_type: "User".to_string(),
                field: "session_id".to_string(),
                value: session_id.to_string(),
            })
    }

    async fn find_all(&self) -> StorageResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, session_id, is_guest, balance_cents, created_at, updated_at
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn delete(&self, id: UserId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::user_not_found(id));
        }

        Ok(())
    }
}
