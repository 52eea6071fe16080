//! Coin acceptor line protocol.
//!
//! Decodes the newline-delimited ASCII the coin acceptor sends into typed
//! [`HardwareEvent`]s and encodes the replies the kiosk sends back.

pub mod builder;
pub mod error;
pub mod event;
pub mod line_buffer;
pub mod parser;

pub use builder::{DeviceReply, format_message};
pub use error::{ParseError, ParseResult};
pub use event::HardwareEvent;
pub use line_buffer::LineBuffer;
pub use parser::MessageParser;
