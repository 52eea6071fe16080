pub mod config;
pub mod constants;
pub mod error;
pub mod store;
pub mod types;

pub use config::KioskConfig;
pub use error::{Error, ErrorKind, Result};
pub use store::{KeyValueStore, MemoryStore, StoreValue};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
