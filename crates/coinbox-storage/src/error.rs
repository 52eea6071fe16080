use coinbox_core::ErrorKind;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// SQLite primary result codes that mean "another connection holds the
/// lock"; the transaction did not commit and can be retried.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Ledger transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn user_not_found(user_id: i64) -> Self {
        Self::NotFound {
            entity_type: "User".to_string(),
            field: "id".to_string(),
            value: user_id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(_) | Self::Migration(_) | Self::Timeout(_) => {
                ErrorKind::PersistenceFailure
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::InvalidInput,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the failure was lock contention that a fresh transaction can
    /// get past.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xFF, SQLITE_BUSY | SQLITE_LOCKED)),
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            StorageError::user_not_found(7).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StorageError::Validation("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            StorageError::InsufficientBalance {
                requested: Decimal::TEN,
                available: Decimal::ONE,
            }
            .kind(),
            ErrorKind::InsufficientBalance
        );
        assert_eq!(
            StorageError::Timeout(Duration::from_secs(5)).kind(),
            ErrorKind::PersistenceFailure
        );
        assert_eq!(
            StorageError::Database(sqlx::Error::RowNotFound).kind(),
            ErrorKind::PersistenceFailure
        );
    }

    #[test]
    fn test_retryable() {
        assert!(StorageError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StorageError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!StorageError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!StorageError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        assert_eq!(
            StorageError::user_not_found(42).to_string(),
            "Entity not found: User with id=42"
        );
    }
}
