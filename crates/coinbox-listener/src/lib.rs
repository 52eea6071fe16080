//! Background listener for the coin acceptor.
//!
//! [`ListenerLoop`] polls the serial link and hands every parsed event to the
//! [`CoinAcceptorService`], which updates device health, routes coins through
//! the active [`CreditPathway`] and answers the device.

pub mod listener;
pub mod pathway;
pub mod service;

pub use listener::{ListenerConfig, ListenerLoop};
pub use pathway::{ActiveSession, CoinOutcome, CreditPathway};
pub use service::{CoinAcceptorService, DeviceStatus, EventOutcome};
