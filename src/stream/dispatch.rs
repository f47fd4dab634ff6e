use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, warn};

use tokio::sync::mpsc;

use crate::core::{BoxError, Spawn};

use super::listener::{ConsumerError, Listener};
use super::msg::{Delivery, HandshakeCallback};


fn panic_message(payload: Box<dyn Any + Send>) -> String {
	match payload.downcast::<String>() {
		Ok(s) => *s,
		Err(payload) => match payload.downcast::<&'static str>() {
			Ok(s) => (*s).to_string(),
			Err(_) => "non-string panic payload".to_string(),
		},
	}
}

/// Run a consumer callback, converting both error returns and panics.
fn isolate<F: FnOnce() -> Result<(), BoxError>>(f: F) -> Result<(), ConsumerError> {
	match panic::catch_unwind(AssertUnwindSafe(f)) {
		Ok(Ok(())) => Ok(()),
		Ok(Err(e)) => Err(ConsumerError::Failed(e)),
		Err(payload) => Err(ConsumerError::Panicked(panic_message(payload))),
	}
}

/**
Consumer side of a connection.

Receives deliveries from the worker and invokes the listener for each, one
at a time. Runs as its own task so that a slow consumer delays only itself,
never the draining of the socket.
*/
pub(super) struct Dispatcher<L> {
	rx: mpsc::UnboundedReceiver<Delivery>,
	listener: L,
	handshake: Option<HandshakeCallback>,
}

impl<L: Listener> Dispatcher<L> {
	pub(super) fn new(rx: mpsc::UnboundedReceiver<Delivery>, listener: L) -> Self {
		Self{
			rx,
			listener,
			handshake: None,
		}
	}

	fn report(&mut self, result: Result<(), ConsumerError>) {
		if let Err(e) = result {
			let listener = &mut self.listener;
			if let Err(again) = isolate(move || {
				listener.on_consumer_error(e);
				Ok(())
			}) {
				warn!("consumer error handler failed as well: {}", again);
			}
		}
	}

	async fn run(mut self) {
		while let Some(delivery) = self.rx.recv().await {
			match delivery {
				Delivery::ArmHandshake(cb) => {
					self.handshake = cb;
				},
				Delivery::Handshake(msg) => {
					let result = match self.handshake.take() {
						Some(cb) => isolate(move || cb(msg)),
						None => {
							let listener = &mut self.listener;
							isolate(move || listener.on_handshake(msg))
						},
					};
					self.report(result);
				},
				Delivery::Message(msg) => {
					let listener = &mut self.listener;
					let result = isolate(move || listener.on_message(msg));
					self.report(result);
				},
				Delivery::Disconnect(error) => {
					let listener = &mut self.listener;
					if let Err(e) = isolate(move || {
						listener.on_disconnect(error.as_ref());
						Ok(())
					}) {
						warn!("disconnect handler failed: {}", e);
					}
					return
				},
			}
		}
		// the worker exits only after sending Disconnect
		debug!("dispatcher channel closed without disconnect notification");
	}
}

impl<L: Listener> Spawn for Dispatcher<L> {
	fn spawn(self) {
		tokio::spawn(async move { self.run().await });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::fmt;
	use std::sync::{Arc, Mutex};

	use bytes::Bytes;

	use crate::error::TransportError;
	use crate::message::FramedMessage;

	#[derive(Debug)]
	struct Boom;

	impl fmt::Display for Boom {
		fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
			f.write_str("boom")
		}
	}

	impl std::error::Error for Boom {}

	#[derive(Clone, Default)]
	struct Log(Arc<Mutex<Vec<String>>>);

	impl Log {
		fn push(&self, s: String) {
			self.0.lock().unwrap().push(s);
		}

		fn entries(&self) -> Vec<String> {
			self.0.lock().unwrap().clone()
		}
	}

	struct Recording(Log);

	impl Listener for Recording {
		fn on_message(&mut self, msg: FramedMessage) -> Result<(), BoxError> {
			match msg.payload() {
				b"fail" => Err(Boom.into()),
				b"panic" => panic!("consumer exploded"),
				other => {
					self.0.push(format!("msg:{}", String::from_utf8_lossy(other)));
					Ok(())
				},
			}
		}

		fn on_handshake(&mut self, msg: FramedMessage) -> Result<(), BoxError> {
			self.0.push(format!("listener-hs:{}", String::from_utf8_lossy(msg.payload())));
			Ok(())
		}

		fn on_consumer_error(&mut self, err: ConsumerError) {
			self.0.push(format!("err:{}", err));
		}

		fn on_disconnect(&mut self, error: Option<&TransportError>) {
			self.0.push(format!("disconnect:{}", error.is_some()));
		}
	}

	fn msg(data: &'static [u8]) -> FramedMessage {
		FramedMessage::new(Bytes::from_static(data))
	}

	async fn run_with(deliveries: Vec<Delivery>) -> Vec<String> {
		let log = Log::default();
		let (tx, rx) = mpsc::unbounded_channel();
		for d in deliveries {
			tx.send(d).ok().unwrap();
		}
		Dispatcher::new(rx, Recording(log.clone())).run().await;
		log.entries()
	}

	#[tokio::test]
	async fn consumer_failures_do_not_stop_delivery() {
		let entries = run_with(vec![
			Delivery::Message(msg(b"a")),
			Delivery::Message(msg(b"fail")),
			Delivery::Message(msg(b"panic")),
			Delivery::Message(msg(b"b")),
			Delivery::Disconnect(None),
		]).await;
		assert_eq!(entries, vec![
			"msg:a".to_string(),
			"err:message consumer failed: boom".to_string(),
			"err:message consumer panicked: consumer exploded".to_string(),
			"msg:b".to_string(),
			"disconnect:false".to_string(),
		]);
	}

	#[tokio::test]
	async fn armed_callback_takes_the_handshake_once() {
		let seen = Log::default();
		let cb_seen = seen.clone();
		let cb: HandshakeCallback = Box::new(move |m: FramedMessage| -> Result<(), BoxError> {
			cb_seen.push(format!("cb-hs:{}", String::from_utf8_lossy(m.payload())));
			Ok(())
		});
		let entries = run_with(vec![
			Delivery::ArmHandshake(Some(cb)),
			Delivery::Handshake(msg(b"first")),
			Delivery::Handshake(msg(b"second")),
			Delivery::Disconnect(Some(TransportError::Closed{pending: 0})),
		]).await;
		assert_eq!(seen.entries(), vec!["cb-hs:first".to_string()]);
		assert_eq!(entries, vec![
			"listener-hs:second".to_string(),
			"disconnect:true".to_string(),
		]);
	}

	#[tokio::test]
	async fn nothing_after_disconnect() {
		let entries = run_with(vec![
			Delivery::Disconnect(None),
			Delivery::Message(msg(b"late")),
		]).await;
		assert_eq!(entries, vec!["disconnect:false".to_string()]);
	}
}
