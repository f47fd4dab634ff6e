#![allow(dead_code)]

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use stream_transport::{
	BoxError,
	Connection,
	ConsumerError,
	FramedMessage,
	Listener,
	StreamConfig,
	TransportError,
};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	Message(Vec<u8>),
	Handshake(Vec<u8>),
	ConsumerError(String),
	Disconnect(Option<String>),
}

#[derive(Debug)]
pub struct Rejected;

impl fmt::Display for Rejected {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str("rejected")
	}
}

impl std::error::Error for Rejected {}

/// Forwards every callback into a channel. Messages with payload `reject`
/// make the consumer fail.
pub struct ChannelListener {
	tx: mpsc::UnboundedSender<Event>,
}

impl Listener for ChannelListener {
	fn on_message(&mut self, msg: FramedMessage) -> Result<(), BoxError> {
		if msg.payload() == b"reject" {
			return Err(Rejected.into())
		}
		let _ = self.tx.send(Event::Message(msg.payload().to_vec()));
		Ok(())
	}

	fn on_handshake(&mut self, msg: FramedMessage) -> Result<(), BoxError> {
		let _ = self.tx.send(Event::Handshake(msg.payload().to_vec()));
		Ok(())
	}

	fn on_consumer_error(&mut self, err: ConsumerError) {
		let _ = self.tx.send(Event::ConsumerError(err.to_string()));
	}

	fn on_disconnect(&mut self, error: Option<&TransportError>) {
		let _ = self.tx.send(Event::Disconnect(error.map(|e| e.to_string())));
	}
}

pub fn channel_listener() -> (ChannelListener, mpsc::UnboundedReceiver<Event>) {
	let (tx, rx) = mpsc::unbounded_channel();
	(ChannelListener{tx}, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
	tokio::time::timeout(WAIT, rx.recv())
		.await
		.expect("timed out waiting for an event")
		.expect("listener dropped without further events")
}

pub async fn bind() -> (TcpListener, SocketAddr) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	(listener, addr)
}

/// Accept one socket and wrap it, arming the handshake so that it is
/// reported as `Event::Handshake`.
pub async fn accept_one(listener: &TcpListener) -> (Connection, mpsc::UnboundedReceiver<Event>) {
	let (sock, _) = tokio::time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
	let (events, rx) = channel_listener();
	let hs_tx = events.tx.clone();
	let conn = Connection::accept(sock, events, &StreamConfig::default()).unwrap();
	conn.await_handshake(move |msg| {
		let _ = hs_tx.send(Event::Handshake(msg.payload().to_vec()));
		Ok(())
	}).unwrap();
	(conn, rx)
}

pub struct Pair {
	pub client: Connection,
	pub client_events: mpsc::UnboundedReceiver<Event>,
	pub server: Connection,
	pub server_events: mpsc::UnboundedReceiver<Event>,
}

/// A dialed client and its accepted counterpart, past the client's handshake.
pub async fn connected_pair(client_hello: &[u8]) -> Pair {
	let (listener, addr) = bind().await;
	let (events, client_events) = channel_listener();
	let client = Connection::dial(addr, WAIT, Some(client_hello), events).await.unwrap();
	let (server, mut server_events) = accept_one(&listener).await;

	assert_eq!(next_event(&mut server_events).await, Event::Handshake(client_hello.to_vec()));
	Pair{client, client_events, server, server_events}
}

/// Dial with a raw socket which sends whatever the test writes.
pub async fn raw_peer() -> (TcpStream, Connection, mpsc::UnboundedReceiver<Event>) {
	let (listener, addr) = bind().await;
	let raw = TcpStream::connect(addr).await.unwrap();
	raw.set_nodelay(true).unwrap();
	let (conn, events) = accept_one(&listener).await;
	(raw, conn, events)
}
