use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;

use log::debug;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::codec::{self, ProtocolViolation};
use crate::config::{self, Config, StreamConfig};
use crate::core::{BoxError, Spawn};
use crate::error::TransportError;
use crate::message::FramedMessage;
use crate::stats::{Statistics, StatsSnapshot};

use super::connect::Connector;
use super::dispatch::Dispatcher;
use super::listener::Listener;
use super::msg::{
	ControlMessage,
	HandshakeCallback,
	SocketOption,
};
use super::state::{
	ConnectionState,
	StateCell,
	StateTransitionError,
};
use super::worker::{
	HandshakeStage,
	StreamWorker,
};


/// State shared between a [`Connection`] handle and its worker.
pub(super) struct Shared {
	pub(super) state: StateCell,
	pub(super) stats: Statistics,
	handshake_armed: AtomicBool,
}

impl Shared {
	fn new(state: ConnectionState, handshake_armed: bool) -> Self {
		Self{
			state: StateCell::new(state),
			stats: Statistics::default(),
			handshake_armed: AtomicBool::new(handshake_armed),
		}
	}
}

/**
One framed, bidirectional connection over a TCP stream.

Created either by [`Connection::dial`] (client side) or by
[`Connection::accept`] from a socket handed over by a listener (server
side). The socket itself is owned by a worker task; this handle only queues
requests for it, so none of its methods block.

Dropping the handle closes the connection like [`Connection::close`].
*/
pub struct Connection {
	tx: mpsc::UnboundedSender<ControlMessage>,
	shared: Arc<Shared>,
	local_addr: SocketAddr,
	peer_addr: SocketAddr,
	max_frame_size: usize,
}

impl Connection {
	fn spawn<L: Listener>(
			sock: TcpStream,
			local_addr: SocketAddr,
			peer_addr: SocketAddr,
			shared: Arc<Shared>,
			listener: L,
			cfg: StreamConfig,
			handshake: HandshakeStage,
			hello: Option<Bytes>,
	) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
		if let Some(buf) = hello {
			// queued before the worker exists, so it is the first frame out
			let _ = tx.send(ControlMessage::Write(buf));
		}

		Dispatcher::new(delivery_rx, listener).spawn();
		StreamWorker::new(
			rx,
			sock,
			peer_addr,
			cfg,
			handshake,
			shared.clone(),
			delivery_tx,
		).spawn();

		Self{
			tx,
			shared,
			local_addr,
			peer_addr,
			max_frame_size: cfg.max_frame_size,
		}
	}

	/**
	Wrap an already connected socket, e.g. one returned by a listener.

	The connection starts out `Connected`, but nothing is read until the
	caller arms the handshake with [`Connection::await_handshake`].

	Must be called from within a tokio runtime.
	*/
	pub fn accept<L: Listener>(sock: TcpStream, listener: L, cfg: &StreamConfig) -> Result<Self, TransportError> {
		sock.set_nodelay(cfg.nodelay).map_err(TransportError::Io)?;
		socket2::SockRef::from(&sock).set_keepalive(cfg.keepalive).map_err(TransportError::Io)?;
		let local_addr = sock.local_addr().map_err(TransportError::Io)?;
		let peer_addr = sock.peer_addr().map_err(TransportError::Io)?;
		debug!("accepted connection from {}", peer_addr);
		let shared = Arc::new(Shared::new(ConnectionState::Connected, false));
		Ok(Self::spawn(sock, local_addr, peer_addr, shared, listener, *cfg, HandshakeStage::Unarmed, None))
	}

	/**
	Connect to `addr` and send the handshake.

	Waits at most `timeout` for the connection to be established. The
	remaining settings come from the process-wide [`config::current`].
	*/
	pub async fn dial<L: Listener>(
			addr: SocketAddr,
			timeout: Duration,
			handshake: Option<&[u8]>,
			listener: L,
	) -> Result<Self, TransportError> {
		let mut cfg = config::current();
		cfg.client.connect_timeout = timeout;
		Self::dial_with_config(addr, handshake, listener, &cfg).await
	}

	/**
	Connect to `addr` using an explicit configuration.

	On success, the connection is `Connected` and our handshake, the
	reserved byte followed by `handshake`, is queued as the first frame.
	Frames from the acceptor are delivered as plain messages, unless
	[`config::ClientConfig::handshake_reply`] is set: then the first one is
	taken as the acceptor's handshake and reported through
	[`Listener::on_handshake`].

	Any failure to establish the connection, including running out of time,
	is reported as [`TransportError::Connect`]. Once this returns `Ok`, all
	later failures go to [`Listener::on_disconnect`] only.
	*/
	pub async fn dial_with_config<L: Listener>(
			addr: SocketAddr,
			handshake: Option<&[u8]>,
			listener: L,
			cfg: &Config,
	) -> Result<Self, TransportError> {
		let hello = handshake.unwrap_or(&[]);
		if hello.len() + 1 > cfg.stream.max_frame_size {
			return Err(ProtocolViolation::FrameTooLarge{declared: hello.len() + 1, max: cfg.stream.max_frame_size}.into())
		}
		let hello = codec::frame_handshake(hello)?;

		// a dialed connection never arms a handshake callback
		let shared = Arc::new(Shared::new(ConnectionState::NotConnected, true));
		shared.state.begin_connect()?;
		debug!("connecting to {}", addr);

		let connected = Connector::new(addr, cfg.client, cfg.stream).connect().await.and_then(|sock| {
			let local_addr = sock.local_addr()?;
			let peer_addr = sock.peer_addr()?;
			Ok((sock, local_addr, peer_addr))
		});
		let (sock, local_addr, peer_addr) = match connected {
			Ok(v) => v,
			Err(e) => {
				debug!("failed to connect to {}: {}", addr, e);
				shared.state.begin_disconnect();
				shared.state.disconnect();
				return Err(TransportError::Connect(e))
			},
		};

		// no worker runs yet, so nothing can have moved the state meanwhile
		shared.state.connect()?;
		let stage = if cfg.client.handshake_reply {
			HandshakeStage::Armed
		} else {
			HandshakeStage::Complete
		};
		debug!("connected to {}", peer_addr);
		Ok(Self::spawn(sock, local_addr, peer_addr, shared, listener, cfg.stream, stage, Some(hello)))
	}

	fn send_control(&self, msg: ControlMessage) -> Result<(), TransportError> {
		match self.tx.send(msg) {
			Ok(()) => Ok(()),
			// worker is gone, the connection is over
			Err(_) => Err(StateTransitionError::NotConnected.into()),
		}
	}

	fn arm_handshake(&self, cb: HandshakeCallback) -> Result<(), TransportError> {
		if self.shared.handshake_armed.swap(true, Ordering::AcqRel) {
			return Err(StateTransitionError::HandshakeArmed.into())
		}
		self.send_control(ControlMessage::ArmHandshake(Some(cb)))
	}

	fn check_frame_size(&self, length: usize) -> Result<(), TransportError> {
		if length > self.max_frame_size {
			return Err(ProtocolViolation::FrameTooLarge{declared: length, max: self.max_frame_size}.into())
		}
		Ok(())
	}

	/**
	Start receiving, delivering the peer's handshake to `callback`.

	The callback gets the handshake payload without its reserved leading
	byte and runs exactly once. All later messages go to
	[`Listener::on_message`]. Can only be armed once per connection.
	*/
	pub fn await_handshake<F>(&self, callback: F) -> Result<(), TransportError>
		where F: FnOnce(FramedMessage) -> Result<(), BoxError> + Send + 'static
	{
		self.shared.state.check_connected()?;
		let callback: HandshakeCallback = Box::new(callback);
		self.arm_handshake(callback)
	}

	/// Queue `payload` as one frame. Does not wait for the write.
	pub fn send_framed(&self, payload: &[u8]) -> Result<(), TransportError> {
		self.shared.state.check_connected()?;
		self.check_frame_size(payload.len())?;
		let buf = codec::frame(payload)?;
		self.send_control(ControlMessage::Write(buf))
	}

	/// Queue our handshake: the reserved byte followed by `payload`.
	///
	/// [`Connection::dial`] does this on its own. The accepting side only
	/// uses it to answer a dialer which set
	/// [`config::ClientConfig::handshake_reply`]; any other dialer would see
	/// the reserved byte as part of a plain message.
	pub fn send_handshake(&self, payload: &[u8]) -> Result<(), TransportError> {
		self.shared.state.check_connected()?;
		self.check_frame_size(payload.len() + 1)?;
		let buf = codec::frame_handshake(payload)?;
		self.send_control(ControlMessage::Write(buf))
	}

	pub fn set_option(&self, option: SocketOption) -> Result<(), TransportError> {
		self.shared.state.check_connected()?;
		self.send_control(ControlMessage::SetOption(option))
	}

	/**
	Close the connection.

	Frames queued before the call are still flushed, for at most
	[`StreamConfig::close_timeout`]; a peer which stopped reading delays
	the teardown by that long. Safe to call any number of times; calls after
	the first have no effect.
	*/
	pub fn close(&self) {
		self.shared.state.begin_disconnect();
		// this can only fail when the socket is already dead
		let _ = self.tx.send(ControlMessage::Close);
	}

	/// Wait until the connection is torn down and its socket released.
	pub async fn closed(&self) {
		self.shared.state.wait_disconnected().await
	}

	/// Snapshot of the connection state; may be stale by the time it is used.
	pub fn state(&self) -> ConnectionState {
		self.shared.state.get()
	}

	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	pub fn peer_addr(&self) -> SocketAddr {
		self.peer_addr
	}

	pub fn stats(&self) -> StatsSnapshot {
		self.shared.stats.snapshot()
	}
}

impl fmt::Debug for Connection {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Connection")
			.field("local_addr", &self.local_addr)
			.field("peer_addr", &self.peer_addr)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}
