use bytes::Bytes;

use crate::core::BoxError;
use crate::error::TransportError;
use crate::message::FramedMessage;


/// One-shot consumer for the stripped handshake payload.
pub(super) type HandshakeCallback = Box<dyn FnOnce(FramedMessage) -> Result<(), BoxError> + Send + 'static>;

/// Socket options which can be changed on a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
	KeepAlive(bool),
	NoDelay(bool),
}

/// Requests from the [`super::Connection`] handle to its worker.
pub(super) enum ControlMessage {
	Close,
	/// An already framed buffer.
	Write(Bytes),
	/// Start receiving. The first frame is the handshake; `None` routes it to
	/// [`super::Listener::on_handshake`].
	ArmHandshake(Option<HandshakeCallback>),
	SetOption(SocketOption),
}

/// Results from the worker to the dispatcher, in stream order.
pub(super) enum Delivery {
	ArmHandshake(Option<HandshakeCallback>),
	Handshake(FramedMessage),
	Message(FramedMessage),
	/// Always the last delivery.
	Disconnect(Option<TransportError>),
}
