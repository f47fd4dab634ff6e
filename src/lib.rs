/*!
# Framed stream transport

Turns a reliable, ordered byte stream into discrete messages and drives the
connection through its lifecycle: dialing, handshake, steady-state exchange
and teardown.

Every message on the wire is a 4 byte big-endian length followed by the
payload (see [`codec`]). The first message the dialing side sends is the
handshake, whose leading reserved byte is stripped before the accepting side
hands the payload out. Everything else, including all frames from the
accepting side, is delivered unchanged.
*/

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

mod core;
mod conversion;
mod error;
mod ioutil;
mod stats;
mod stream;

pub mod codec;
pub mod config;
pub mod message;

pub use crate::core::BoxError;
pub use crate::codec::ProtocolViolation;
pub use crate::config::{
	AddressFamily,
	ClientConfig,
	Config,
	ConfigError,
	StreamConfig,
};
pub use crate::error::TransportError;
pub use crate::message::FramedMessage;
pub use crate::stats::StatsSnapshot;
pub use crate::stream::{
	Connection,
	ConnectionState,
	ConsumerError,
	Listener,
	SocketOption,
	StateTransitionError,
};
