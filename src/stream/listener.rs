use std::fmt;

use log::warn;

use crate::core::BoxError;
use crate::error::TransportError;
use crate::message::FramedMessage;

/**
A message consumer failed while processing a delivered message.

The connection keeps receiving regardless.
*/
#[derive(Debug)]
pub enum ConsumerError {
	/// The consumer returned an error.
	Failed(BoxError),
	/// The consumer panicked; carries the panic message if it was a string.
	Panicked(String),
}

impl fmt::Display for ConsumerError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Failed(e) => write!(f, "message consumer failed: {}", e),
			Self::Panicked(msg) => write!(f, "message consumer panicked: {}", msg),
		}
	}
}

impl std::error::Error for ConsumerError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Failed(e) => Some(&**e),
			Self::Panicked(_) => None,
		}
	}
}

/**
Callbacks of a connection owner.

All methods are invoked from the connection's dispatcher task, one at a
time and in stream order. They must not block.
*/
pub trait Listener: Send + 'static {
	/// A steady-state message arrived.
	fn on_message(&mut self, msg: FramedMessage) -> Result<(), BoxError>;

	/// The acceptor's handshake reply arrived on a dialed connection which
	/// set [`crate::ClientConfig::handshake_reply`], with the reserved byte
	/// already stripped.
	///
	/// Handshakes awaited via [`super::Connection::await_handshake`] go to the
	/// callback passed there instead.
	fn on_handshake(&mut self, msg: FramedMessage) -> Result<(), BoxError> {
		let _ = msg;
		Ok(())
	}

	/// A consumer callback failed. The default logs the failure.
	fn on_consumer_error(&mut self, err: ConsumerError) {
		warn!("{}", err);
	}

	/// The connection is gone. `error` is `None` after a local close.
	///
	/// Invoked exactly once, after all messages.
	fn on_disconnect(&mut self, error: Option<&TransportError>) {
		let _ = error;
	}
}
