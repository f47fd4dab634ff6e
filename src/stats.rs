/*!
# Traffic counters

Purely observational. The worker reports every completed frame here with
header and payload bytes accounted separately.
*/
use std::sync::atomic::{AtomicU64, Ordering};


#[derive(Debug, Default)]
pub struct Statistics {
	header_bytes_sent: AtomicU64,
	payload_bytes_sent: AtomicU64,
	messages_sent: AtomicU64,
	header_bytes_received: AtomicU64,
	payload_bytes_received: AtomicU64,
	messages_received: AtomicU64,
}

/// A point-in-time copy of [`Statistics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
	pub header_bytes_sent: u64,
	pub payload_bytes_sent: u64,
	pub messages_sent: u64,
	pub header_bytes_received: u64,
	pub payload_bytes_received: u64,
	pub messages_received: u64,
}

impl Statistics {
	pub(crate) fn record_sent(&self, header_bytes: usize, payload_bytes: usize) {
		self.header_bytes_sent.fetch_add(header_bytes as u64, Ordering::Relaxed);
		self.payload_bytes_sent.fetch_add(payload_bytes as u64, Ordering::Relaxed);
		self.messages_sent.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_received(&self, payload_bytes: usize, header_bytes: usize) {
		self.payload_bytes_received.fetch_add(payload_bytes as u64, Ordering::Relaxed);
		self.header_bytes_received.fetch_add(header_bytes as u64, Ordering::Relaxed);
		self.messages_received.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot{
			header_bytes_sent: self.header_bytes_sent.load(Ordering::Relaxed),
			payload_bytes_sent: self.payload_bytes_sent.load(Ordering::Relaxed),
			messages_sent: self.messages_sent.load(Ordering::Relaxed),
			header_bytes_received: self.header_bytes_received.load(Ordering::Relaxed),
			payload_bytes_received: self.payload_bytes_received.load(Ordering::Relaxed),
			messages_received: self.messages_received.load(Ordering::Relaxed),
		}
	}
}
