/*!
# Framed stream connections, inbound and outbound

This module provides a handle/worker pair for a framed connection over a
TCP stream. The [`Connection`] handle is what callers hold; the socket
itself belongs to a worker task which reassembles incoming frames, writes
queued outgoing frames and tears the connection down on failure. Completed
messages are handed to a dispatcher task which invokes the caller's
[`Listener`].
*/

mod state;
mod msg;
mod receive;
mod worker;
mod dispatch;
mod listener;
mod connect;
mod handle;

pub use state::{
	ConnectionState,
	StateTransitionError,
};

pub use msg::{
	SocketOption,
};

pub use listener::{
	ConsumerError,
	Listener,
};

pub use handle::{
	Connection,
};
