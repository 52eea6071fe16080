use crate::money::from_cents;
use chrono::{DateTime, Utc};
use coinbox_core::{SessionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// A kiosk user with its cached balance.
///
/// `balance` mirrors the signed sum of the user's ledger entries. It is
/// read-only here; only the credit ledger changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    pub name: String,

    /// Web session a guest user was created for.
    pub session_id: Option<String>,

    pub is_guest: bool,

    pub balance: Decimal,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_sufficient_balance(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            session_id: row.try_get("session_id")?,
            is_guest: row.try_get("is_guest")?,
            balance: from_cents(row.try_get("balance_cents")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Data for inserting a user. New users always start at a zero balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub session_id: Option<String>,
    pub is_guest: bool,
}

impl NewUser {
    pub fn registered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session_id: None,
            is_guest: false,
        }
    }

    /// Guest user bound to a web session and named after it.
    pub fn guest(session_id: &SessionId) -> Self {
        Self {
            name: format!("Guest {}", session_id),
            session_id: Some(session_id.to_string()),
            is_guest: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_is_named_after_session() {
        let session = SessionId::new("abc123").unwrap();
        let user = NewUser::guest(&session);

        assert_eq!(user.name, "Guest abc123");
        assert_eq!(user.session_id.as_deref(), Some("abc123"));
        assert!(user.is_guest);
    }

    #[test]
    fn test_registered_user() {
        let user = NewUser::registered("Operator");
        assert!(!user.is_guest);
        assert!(user.session_id.is_none());
    }
}
