use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use bytes::{Buf, Bytes};

use log::{debug, error, warn};

use tokio::select;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp;
use tokio::sync::mpsc;

use crate::codec::HEADER_SIZE;
use crate::config;
use crate::core::Spawn;
use crate::error::TransportError;
use crate::ioutil::iotimeout;
use crate::message::FramedMessage;

use super::handle::Shared;
use super::msg::{
	ControlMessage,
	Delivery,
	SocketOption,
};
use super::receive::ReceivePipeline;
use super::state::ConnectionState;


enum MsgResult {
	Continue,
	Exit,
}

/// Where the connection stands with respect to the peer's handshake.
///
/// Nothing is read off the socket until the handshake has been armed. A
/// dialed connection starts in `Complete` unless it expects a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HandshakeStage {
	Unarmed,
	Armed,
	Complete,
}

impl HandshakeStage {
	fn may_read(&self) -> bool {
		match self {
			Self::Unarmed => false,
			Self::Armed | Self::Complete => true,
		}
	}
}

struct OutgoingFrame {
	buf: Bytes,
	len: usize,
}

/// Write as much of `buf` as the socket takes in one go.
///
/// Only advances `buf` once the write completed, so dropping the future is
/// harmless. With no buffer, never completes.
#[inline]
async fn write_some(sock: &mut tcp::OwnedWriteHalf, buf: Option<&mut Bytes>) -> io::Result<()> {
	let buf = match buf {
		Some(buf) => buf,
		None => return std::future::pending().await,
	};
	let n = sock.write(buf.chunk()).await?;
	if n == 0 {
		return Err(io::Error::new(io::ErrorKind::WriteZero, "socket accepted no bytes of the frame"))
	}
	buf.advance(n);
	Ok(())
}

/**
Sole owner of a connection's socket.

Drives the receive pipeline, drains the send queue and processes control
messages from the [`super::Connection`] handle, all from one task. Completed
messages are passed on to the dispatcher task; the next read is issued
before the consumer gets to see the message.

Any failure ends the worker through [`StreamWorker::teardown`], which is
consumed by value and therefore runs exactly once.
*/
pub(super) struct StreamWorker {
	rx: mpsc::UnboundedReceiver<ControlMessage>,
	sock_rx: tcp::OwnedReadHalf,
	sock_tx: tcp::OwnedWriteHalf,
	peer: SocketAddr,
	cfg: config::StreamConfig,
	pipeline: ReceivePipeline,
	handshake: HandshakeStage,
	txq: VecDeque<OutgoingFrame>,
	shared: Arc<Shared>,
	deliveries: mpsc::UnboundedSender<Delivery>,
}

impl StreamWorker {
	pub(super) fn new(
			rx: mpsc::UnboundedReceiver<ControlMessage>,
			sock: TcpStream,
			peer: SocketAddr,
			cfg: config::StreamConfig,
			handshake: HandshakeStage,
			shared: Arc<Shared>,
			deliveries: mpsc::UnboundedSender<Delivery>,
	) -> Self {
		let (sock_rx, sock_tx) = sock.into_split();
		Self{
			rx,
			sock_rx,
			sock_tx,
			peer,
			cfg,
			pipeline: ReceivePipeline::new(cfg.max_frame_size),
			handshake,
			txq: VecDeque::new(),
			shared,
			deliveries,
		}
	}

	fn set_option(&self, option: SocketOption) -> io::Result<()> {
		match option {
			SocketOption::KeepAlive(enabled) => {
				nix::sys::socket::setsockopt(
					self.sock_tx.as_ref().as_raw_fd(),
					nix::sys::socket::sockopt::KeepAlive,
					&enabled,
				)?;
			},
			SocketOption::NoDelay(enabled) => self.sock_tx.as_ref().set_nodelay(enabled)?,
		}
		Ok(())
	}

	/// Pop the head of the send queue if it has been written completely.
	fn advance_queue(&mut self) {
		let done = match self.txq.front() {
			Some(frame) => !frame.buf.has_remaining(),
			None => false,
		};
		if done {
			if let Some(frame) = self.txq.pop_front() {
				self.shared.stats.record_sent(HEADER_SIZE, frame.len - HEADER_SIZE);
			}
		}
	}

	async fn force_flush(&mut self) -> io::Result<()> {
		while let Some(frame) = self.txq.front_mut() {
			self.sock_tx.write_all_buf(&mut frame.buf).await?;
			self.advance_queue();
		}
		self.sock_tx.flush().await?;
		Ok(())
	}

	/// Flush what callers already queued, bounded by the close timeout.
	async fn close_gracefully(&mut self) -> Option<TransportError> {
		let close_timeout = self.cfg.close_timeout;
		match iotimeout(close_timeout, self.force_flush(), "timed out flushing queued frames").await {
			Ok(()) => None,
			Err(e) => Some(TransportError::Io(e)),
		}
	}

	/// Hand a completed frame to the dispatcher.
	///
	/// The first frame after arming is the handshake and loses its reserved
	/// leading byte; everything after goes out unchanged.
	fn deliver(&mut self, mut msg: FramedMessage) -> Result<(), TransportError> {
		self.shared.stats.record_received(msg.length(), HEADER_SIZE);
		let delivery = match self.handshake {
			HandshakeStage::Armed => {
				msg.strip_reserved()?;
				self.handshake = HandshakeStage::Complete;
				Delivery::Handshake(msg)
			},
			HandshakeStage::Complete => Delivery::Message(msg),
			// reads are disabled until the handshake is armed
			HandshakeStage::Unarmed => unreachable!("frame received before handshake was armed"),
		};
		// only fails once the dispatcher saw the disconnect, i.e. never while we run
		let _ = self.deliveries.send(delivery);
		Ok(())
	}

	#[inline]
	async fn proc_msg(&mut self, msg: ControlMessage) -> Result<MsgResult, TransportError> {
		match msg {
			ControlMessage::Close => Ok(MsgResult::Exit),
			ControlMessage::Write(buf) => {
				self.txq.push_back(OutgoingFrame{
					len: buf.len(),
					buf,
				});
				Ok(MsgResult::Continue)
			},
			ControlMessage::ArmHandshake(cb) => {
				match self.handshake {
					HandshakeStage::Unarmed => {
						let _ = self.deliveries.send(Delivery::ArmHandshake(cb));
						self.handshake = HandshakeStage::Armed;
					},
					HandshakeStage::Armed | HandshakeStage::Complete => {
						warn!("connection to {}: handshake already awaited, ignoring", self.peer);
					},
				}
				Ok(MsgResult::Continue)
			},
			ControlMessage::SetOption(option) => match self.set_option(option) {
				Ok(()) => Ok(MsgResult::Continue),
				Err(e) => {
					error!("connection to {}: failed to apply {:?}: {}", self.peer, option, e);
					Err(TransportError::Io(e))
				},
			},
		}
	}

	/// Run until the connection ends; returns the reason, `None` for a local
	/// close.
	async fn serve(&mut self) -> Option<TransportError> {
		loop {
			let may_read = self.handshake.may_read();
			let txbuf = self.txq.front_mut().map(|frame| &mut frame.buf);
			let may_write = txbuf.is_some();

			select! {
				result = self.pipeline.read_from(&mut self.sock_rx), if may_read => match result {
					Ok(Some(msg)) => {
						if let Err(e) = self.deliver(msg) {
							return Some(e)
						}
					},
					Ok(None) => (),
					Err(e) => return Some(e),
				},
				result = write_some(&mut self.sock_tx, txbuf), if may_write => match result {
					Ok(()) => self.advance_queue(),
					Err(e) => return Some(TransportError::Io(e)),
				},
				msg = self.rx.recv() => match msg {
					Some(msg) => match self.proc_msg(msg).await {
						Ok(MsgResult::Continue) => (),
						Ok(MsgResult::Exit) => return self.close_gracefully().await,
						Err(e) => return Some(e),
					},
					// handle dropped, same as a close
					None => return self.close_gracefully().await,
				},
			}
		}
	}

	/// Shut down and release the socket, then notify the dispatcher.
	async fn teardown(self, error: Option<TransportError>) {
		let Self{shared, deliveries, peer, sock_rx, mut sock_tx, ..} = self;
		let previous = shared.state.begin_disconnect();
		match error {
			Some(ref e) => debug!("connection to {} failed: {}", peer, e),
			None => debug!("closing connection to {}", peer),
		}
		if previous != ConnectionState::NotConnected {
			// the peer may be gone already, nothing left to report then
			let _ = sock_tx.shutdown().await;
		}
		drop(sock_tx);
		drop(sock_rx);
		shared.state.disconnect();
		let _ = deliveries.send(Delivery::Disconnect(error));
	}

	async fn run(mut self) {
		let error = self.serve().await;
		self.teardown(error).await;
	}
}

impl Spawn for StreamWorker {
	fn spawn(self) {
		tokio::spawn(async move { self.run().await });
	}
}
