/*!
# Received messages

A [`FramedMessage`] is one fully reassembled payload. It is a view on an
immutable buffer described by three cursors:

- `offset`: start of the valid payload within the buffer,
- `length`: number of valid payload bytes,
- `position`: read cursor relative to `offset`, `0 <= position <= length`.

The connection hands each message to the consumer exactly once with
`position == 0`. The consumer then owns it and reads it through the
[`bytes::Buf`] implementation.
*/
use std::fmt;

use bytes::{Buf, Bytes};

use crate::codec::ProtocolViolation;


#[derive(Clone, PartialEq, Eq)]
pub struct FramedMessage {
	buf: Bytes,
	offset: usize,
	length: usize,
	position: usize,
}

impl FramedMessage {
	/// Wrap a complete payload buffer.
	pub fn new(buf: Bytes) -> Self {
		let length = buf.len();
		Self{
			buf,
			offset: 0,
			length,
			position: 0,
		}
	}

	pub fn empty() -> Self {
		Self::new(Bytes::new())
	}

	pub fn offset(&self) -> usize {
		self.offset
	}

	pub fn length(&self) -> usize {
		self.length
	}

	pub fn position(&self) -> usize {
		self.position
	}

	/// Capacity of the underlying buffer; always `>= offset + length`.
	pub fn capacity(&self) -> usize {
		self.buf.len()
	}

	/// Move the read cursor. `position` is clamped to `length`.
	pub fn set_position(&mut self, position: usize) {
		self.position = position.min(self.length);
	}

	/// The whole valid payload, independent of the read cursor.
	pub fn payload(&self) -> &[u8] {
		&self.buf[self.offset..self.offset + self.length]
	}

	/// The unread part of the payload.
	pub fn unread(&self) -> &[u8] {
		&self.payload()[self.position..]
	}

	/// Drop the leading reserved byte of a handshake payload.
	///
	/// Shifts `offset` forward and `length` back by one and rewinds the read
	/// cursor.
	pub(crate) fn strip_reserved(&mut self) -> Result<(), ProtocolViolation> {
		if self.length == 0 {
			return Err(ProtocolViolation::EmptyHandshake)
		}
		self.offset += 1;
		self.length -= 1;
		self.position = 0;
		Ok(())
	}

	/// Take the payload out as a cheap slice of the underlying buffer.
	pub fn into_bytes(self) -> Bytes {
		self.buf.slice(self.offset..self.offset + self.length)
	}
}

impl Buf for FramedMessage {
	fn remaining(&self) -> usize {
		self.length - self.position
	}

	fn chunk(&self) -> &[u8] {
		self.unread()
	}

	fn advance(&mut self, cnt: usize) {
		assert!(cnt <= self.remaining(), "cannot advance past the end of the message");
		self.position += cnt;
	}
}

impl fmt::Debug for FramedMessage {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("FramedMessage")
			.field("offset", &self.offset)
			.field("length", &self.length)
			.field("position", &self.position)
			.finish_non_exhaustive()
	}
}
