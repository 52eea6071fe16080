pub mod ledger_entry;
pub mod user;

pub use ledger_entry::{EntryDetails, EntryType, LedgerEntry};
pub use user::{NewUser, User};
