//! Payment sessions for the print kiosk.
//!
//! A [`PaymentCoordinator`] binds a web session to a user and a required
//! amount, credits coins through the [`CreditLedger`](coinbox_storage::CreditLedger)
//! and tracks when the session is paid. Coins reported by the device before
//! any session exists wait in a [`PendingCoinBox`] until a status poll claims
//! them.
//!
//! Two layers validate a coin: the line parser only checks that `COIN:x`
//! is a number in `(0, 100]`, while the coordinator and the pending box
//! accept only the configured denominations.

pub mod coordinator;
pub mod error;
pub mod pending;
pub mod printing;
pub mod session;

pub use coordinator::{CheckoutReceipt, CoinReceipt, PaymentCoordinator, PaymentStatus};
pub use error::{PaymentError, PaymentResult};
pub use pending::PendingCoinBox;
pub use printing::{JobHandle, PrintJobDescriptor, PrintStatus, PrintSubmitter};
pub use session::{PaymentSession, SessionState};
