pub mod ledger_entry;
pub mod user;

pub use ledger_entry::{LedgerEntryRepository, SqliteLedgerEntryRepository};
pub use user::{SqliteUserRepository, UserRepository};
