use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use lazy_static::lazy_static;

use log::debug;

use crate::codec::MAX_FRAME_SIZE;
use crate::conversion::{
	to_bool,
	to_duration,
	to_family,
	to_usize,
};

/// IP version used for outbound sockets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
	V4,
	V6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfig {
	/// Largest payload accepted from or sent to the peer.
	pub max_frame_size: usize,
	/// Bound on flushing queued frames during a graceful close. A peer which
	/// stops reading delays teardown by at most this long.
	pub close_timeout: Duration,
	pub nodelay: bool,
	pub keepalive: bool,
}

impl Default for StreamConfig {
	fn default() -> Self {
		Self{
			max_frame_size: MAX_FRAME_SIZE,
			close_timeout: Duration::new(5, 0),
			// small interactive messages; don't let nagle batch them
			nodelay: true,
			keepalive: false,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	pub connect_timeout: Duration,
	/// `None` picks the family of the target address.
	pub family: Option<AddressFamily>,
	/// Expect the accepting side to answer our handshake with its own (see
	/// [`crate::Connection::send_handshake`]). Off by default, in which case
	/// every frame from the acceptor is a plain message.
	pub handshake_reply: bool,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self{
			connect_timeout: Duration::from_millis(5000),
			family: None,
			handshake_reply: false,
		}
	}
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
	pub stream: StreamConfig,
	pub client: ClientConfig,
}

/**
A configuration option could not be applied.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
	pub key: String,
	pub reason: String,
}

impl fmt::Display for ConfigError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "invalid value for {}: {}", self.key, self.reason)
	}
}

impl std::error::Error for ConfigError {}

macro_rules! option_value {
	($key:expr, $e:expr) => {
		match $e {
			Ok(v) => v,
			Err(reason) => return Err(ConfigError{key: $key.to_string(), reason}),
		}
	}
}

impl Config {
	/// Apply `(key, value)` option pairs. Unknown keys are ignored.
	pub fn update<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(&mut self, options: I) -> Result<(), ConfigError> {
		for (k, v) in options {
			match k {
				"max_frame_size" => self.stream.max_frame_size = option_value!(k, to_usize(v)),
				"close_timeout" => self.stream.close_timeout = option_value!(k, to_duration(v)),
				"nodelay" => self.stream.nodelay = option_value!(k, to_bool(v)),
				"keepalive" => self.stream.keepalive = option_value!(k, to_bool(v)),
				"connect_timeout" => self.client.connect_timeout = option_value!(k, to_duration(v)),
				"address_family" => self.client.family = option_value!(k, to_family(v)),
				"handshake_reply" => self.client.handshake_reply = option_value!(k, to_bool(v)),
				_ => (),
			}
		}
		Ok(())
	}
}

lazy_static! {
	pub(crate) static ref CONFIG: RwLock<Config> = RwLock::new(Config::default());
}

/// The process-wide default configuration.
pub fn current() -> Config {
	match CONFIG.read() {
		Ok(cfg) => *cfg,
		Err(poisoned) => *poisoned.into_inner(),
	}
}

/// Replace the process-wide configuration with defaults updated by `options`.
///
/// On error, the active configuration is left untouched.
pub fn reconfigure<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(options: I) -> Result<(), ConfigError> {
	let mut new_config = Config::default();
	new_config.update(options)?;
	let mut active_config = match CONFIG.write() {
		Ok(cfg) => cfg,
		Err(poisoned) => poisoned.into_inner(),
	};
	*active_config = new_config;
	debug!("Reconfigured: {:?}", *active_config);
	Ok(())
}
