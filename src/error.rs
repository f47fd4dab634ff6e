use std::fmt;
use std::io;

use crate::codec::ProtocolViolation;
use crate::stream::StateTransitionError;

/**
Failure of a connection operation.

Connect-time failures are returned to the dialing caller. Everything which
happens after the connection is established is reported through
[`crate::Listener::on_disconnect`] instead.
*/
#[derive(Debug)]
pub enum TransportError {
	/// The operation is not allowed in the current connection state.
	State(StateTransitionError),

	/// The connection could not be established, including timeouts and an
	/// unavailable address family.
	Connect(io::Error),

	/// The socket failed while sending or receiving.
	Io(io::Error),

	/// The peer closed the stream. `pending` is the number of bytes still
	/// missing from the frame being received, zero if the close happened
	/// between frames.
	Closed {
		pending: usize,
	},

	/// The peer (or the caller) violated the framing protocol.
	Protocol(ProtocolViolation),
}

impl TransportError {
	/// True for the fail-fast condition raised when the connection is not
	/// (or no longer) connected.
	pub fn is_not_connected(&self) -> bool {
		match self {
			Self::State(StateTransitionError::NotConnected) => true,
			_ => false,
		}
	}
}

impl fmt::Display for TransportError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::State(e) => fmt::Display::fmt(e, f),
			Self::Connect(e) => write!(f, "connection failed: {}", e),
			Self::Io(e) => write!(f, "transport failure: {}", e),
			Self::Closed{pending: 0} => f.write_str("connection closed by peer"),
			Self::Closed{pending} => write!(f, "connection closed by peer with {} bytes of the current frame outstanding", pending),
			Self::Protocol(e) => write!(f, "protocol violation: {}", e),
		}
	}
}

impl std::error::Error for TransportError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::State(e) => Some(e),
			Self::Connect(e) | Self::Io(e) => Some(e),
			Self::Protocol(e) => Some(e),
			Self::Closed{..} => None,
		}
	}
}

impl From<StateTransitionError> for TransportError {
	fn from(other: StateTransitionError) -> Self {
		Self::State(other)
	}
}

impl From<ProtocolViolation> for TransportError {
	fn from(other: ProtocolViolation) -> Self {
		Self::Protocol(other)
	}
}
