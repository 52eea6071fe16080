//! Durable credit ledger for the kiosk.
//!
//! SQLite through `sqlx`. Balances are cached on the user row and every
//! change is recorded as an append-only ledger entry in the same
//! transaction, so the cached balance always equals the signed sum of the
//! user's entries.
//!
//! Amounts are [`rust_decimal::Decimal`] in the API and integer cents in the
//! database.
//!
//! The same database also backs [`SqliteStore`], the shared key-value store
//! for device health and pending coin totals.

pub mod connection;
pub mod error;
pub mod kv_store;
pub mod ledger;
pub mod models;
pub mod money;
pub mod repositories;
pub mod transaction;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use kv_store::SqliteStore;
pub use ledger::{CreditLedger, LedgerConfig};
pub use models::{EntryDetails, EntryType, LedgerEntry, NewUser, User};
pub use repositories::{
    LedgerEntryRepository, SqliteLedgerEntryRepository, SqliteUserRepository, UserRepository,
};
