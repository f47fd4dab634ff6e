use std::fmt;

use tokio::sync::watch;

/**
Represents an error during an attempt to mutate a [`ConnectionState`] or to
run an operation which the current state does not permit.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransitionError {
	/// Attempt to execute an operation which requires a connection, but the
	/// socket is already disconnected or has not fully connected yet.
	NotConnected,

	/// Attempt to dial on a connection which has already been used.
	AlreadyConnected,

	/// Attempt to wait for the handshake a second time.
	HandshakeArmed,
}

impl fmt::Display for StateTransitionError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::NotConnected => f.write_str("invalid state: not connected"),
			Self::AlreadyConnected => f.write_str("invalid state: connection already in use"),
			Self::HandshakeArmed => f.write_str("invalid operation: handshake already awaited"),
		}
	}
}

impl std::error::Error for StateTransitionError {}

/**
Lifecycle of a connection.

`NotConnected -> Connecting -> Connected -> Disconnecting -> NotConnected`.
Connections accepted from a listener start out in `Connected`. Once a
connection has returned to `NotConnected`, it is finished for good.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	NotConnected,
	Connecting,
	Connected,
	Disconnecting,
}

impl ConnectionState {
	/// True if send and receive operations are permitted.
	pub fn is_connected(&self) -> bool {
		match self {
			Self::Connected => true,
			_ => false,
		}
	}
}

/**
Shared, observable holder of a [`ConnectionState`].

Transitions are applied atomically under the cell's lock. Reads take a
snapshot which may already be stale by the time the caller acts on it; the
gating built on top of this is best-effort only. A stale "connected" read
results in at most one more failed I/O attempt, which tears down the
connection anyway.
*/
pub(crate) struct StateCell {
	tx: watch::Sender<ConnectionState>,
}

impl StateCell {
	pub(crate) fn new(initial: ConnectionState) -> Self {
		let (tx, _) = watch::channel(initial);
		Self{tx}
	}

	pub(crate) fn get(&self) -> ConnectionState {
		*self.tx.borrow()
	}

	/// Helper to make transitions easier to implement.
	///
	/// `f` maps the current state to the new state plus a result. Subscribers
	/// are only woken if the state actually changed.
	#[inline]
	fn transition_impl<T, F: FnOnce(ConnectionState) -> Result<(ConnectionState, T), StateTransitionError>>(
		&self,
		f: F,
	) -> Result<T, StateTransitionError> {
		let mut result = Err(StateTransitionError::NotConnected);
		self.tx.send_if_modified(|state| {
			let old = *state;
			match f(old) {
				Ok((new, v)) => {
					*state = new;
					result = Ok(v);
					new != old
				}
				Err(e) => {
					result = Err(e);
					false
				}
			}
		});
		result
	}

	/// Start an outbound connection attempt.
	///
	/// Only valid from `NotConnected`.
	pub(crate) fn begin_connect(&self) -> Result<(), StateTransitionError> {
		self.transition_impl(|this| match this {
			ConnectionState::NotConnected => Ok((ConnectionState::Connecting, ())),
			_ => Err(StateTransitionError::AlreadyConnected),
		})
	}

	/// Confirm a successful connection.
	///
	/// This transitions from `Connecting` to `Connected`. Returns true if a
	/// transition took place. Fails if the connection was torn down in the
	/// meantime.
	pub(crate) fn connect(&self) -> Result<bool, StateTransitionError> {
		self.transition_impl(|this| match this {
			ConnectionState::Connecting => Ok((ConnectionState::Connected, true)),
			ConnectionState::Connected => Ok((this, false)),
			ConnectionState::Disconnecting | ConnectionState::NotConnected => Err(StateTransitionError::NotConnected),
		})
	}

	/// Begin teardown.
	///
	/// Moves `Connecting` and `Connected` to `Disconnecting` and returns the
	/// previous state.
	pub(crate) fn begin_disconnect(&self) -> ConnectionState {
		let mut previous = ConnectionState::NotConnected;
		self.tx.send_if_modified(|state| {
			previous = *state;
			match previous {
				ConnectionState::Connecting | ConnectionState::Connected => {
					*state = ConnectionState::Disconnecting;
					true
				}
				_ => false,
			}
		});
		previous
	}

	/// Mark the connection as finished.
	///
	/// Returns true if the state was previously not `NotConnected`.
	pub(crate) fn disconnect(&self) -> bool {
		self.tx.send_if_modified(|state| {
			if *state == ConnectionState::NotConnected {
				false
			} else {
				*state = ConnectionState::NotConnected;
				true
			}
		})
	}

	/// Fail fast unless the connection is `Connected`.
	pub(crate) fn check_connected(&self) -> Result<(), StateTransitionError> {
		if self.get().is_connected() {
			Ok(())
		} else {
			Err(StateTransitionError::NotConnected)
		}
	}

	/// Wait until the connection has reached `NotConnected`.
	pub(crate) async fn wait_disconnected(&self) {
		let mut rx = self.tx.subscribe();
		// the sender lives in self, so this cannot fail while we are borrowed
		let _ = rx.wait_for(|state| *state == ConnectionState::NotConnected).await;
	}
}

impl fmt::Debug for StateCell {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_tuple("StateCell").field(&self.get()).finish()
	}
}
