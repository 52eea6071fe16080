use crate::money::from_cents;
use chrono::{DateTime, Utc};
use coinbox_core::{DeviceId, SessionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;

/// Kind of balance change.
///
/// Stored as snake_case text; the sign of the entry follows from the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EntryType {
    CoinInsert,
    PrintDeduct,
    AdminAdd,
    Refund,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoinInsert => "coin_insert",
            Self::PrintDeduct => "print_deduct",
            Self::AdminAdd => "admin_add",
            Self::Refund => "refund",
        }
    }

    /// Whether entries of this type add to the balance.
    pub fn is_credit(&self) -> bool {
        !matches!(self, Self::PrintDeduct)
    }

    /// Apply an amount of this type to a balance, in cents.
    ///
    /// Returns `None` on overflow or if the result would be negative.
    pub fn apply_cents(&self, balance: i64, amount: i64) -> Option<i64> {
        let after = if self.is_credit() {
            balance.checked_add(amount)?
        } else {
            balance.checked_sub(amount)?
        };
        (after >= 0).then_some(after)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional columns of a ledger entry.
///
/// ```
/// use coinbox_core::{DeviceId, SessionId};
/// use coinbox_storage::EntryDetails;
/// use rust_decimal::Decimal;
///
/// let details = EntryDetails::new()
///     .coin(Decimal::from(5))
///     .session(SessionId::new("s1").unwrap())
///     .device(DeviceId::new("ESP32_COIN_001").unwrap());
///
/// assert_eq!(details.coin_count, Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDetails {
    pub print_job_id: Option<i64>,
    pub coin_value: Option<Decimal>,
    pub coin_count: Option<i64>,
    pub session_id: Option<SessionId>,
    pub device_id: Option<DeviceId>,
}

impl EntryDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_job(mut self, job_id: i64) -> Self {
        self.print_job_id = Some(job_id);
        self
    }

    /// A single coin of `value`.
    pub fn coin(self, value: Decimal) -> Self {
        self.coins(value, 1)
    }

    /// `count` coins worth `value` in total.
    pub fn coins(mut self, value: Decimal, count: i64) -> Self {
        self.coin_value = Some(value);
        self.coin_count = Some(count);
        self
    }

    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn device(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }
}

/// Immutable record of one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    pub entry_type: EntryType,
    /// Always non-negative; the sign comes from `entry_type`.
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub print_job_id: Option<i64>,
    pub coin_value: Option<Decimal>,
    pub coin_count: Option<i64>,
    pub description: String,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Contribution of this entry to the balance.
    pub fn signed_amount(&self) -> Decimal {
        if self.entry_type.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }

    /// Whether `balance_after = balance_before + signed_amount`.
    pub fn is_consistent(&self) -> bool {
        self.balance_after == self.balance_before + self.signed_amount()
    }
}

impl<'r> FromRow<'r, SqliteRow> for LedgerEntry {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let coin_value: Option<i64> = row.try_get("coin_value_cents")?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            entry_type: row.try_get("entry_type")?,
            amount: from_cents(row.try_get("amount_cents")?),
            balance_before: from_cents(row.try_get("balance_before_cents")?),
            balance_after: from_cents(row.try_get("balance_after_cents")?),
            print_job_id: row.try_get("print_job_id")?,
            coin_value: coin_value.map(from_cents),
            coin_count: row.try_get("coin_count")?,
            description: row.try_get("description")?,
            session_id: row.try_get("session_id")?,
            device_id: row.try_get("device_id")?,
            is_verified: row.try_get("is_verified")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
