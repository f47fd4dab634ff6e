/*!
# Length-prefixed framing

Every message on the wire is a 4 byte big-endian unsigned length followed by
exactly that many payload bytes. This module only deals with the byte layout;
it performs no I/O and keeps no state.

The first frame on a connection is the handshake. Its payload starts with a
single reserved byte ([`HANDSHAKE_VERSION`]) which is consumed by the
connection and never shown to steady-state consumers.
*/
use std::convert::TryFrom;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Size of the length header preceding every payload.
pub const HEADER_SIZE: usize = 4;

/// Default upper bound for a single frame payload.
pub const MAX_FRAME_SIZE: usize = 65535;

/// Value of the reserved leading byte of the handshake payload.
pub const HANDSHAKE_VERSION: u8 = 0;

/**
A frame which cannot be encoded or decoded.

All of these are fatal for the connection they occur on.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
	/// Fewer than [`HEADER_SIZE`] bytes were available to parse a header.
	ShortHeader {
		available: usize,
	},

	/// The declared payload length exceeds the supported frame size.
	FrameTooLarge {
		declared: usize,
		max: usize,
	},

	/// More payload bytes were requested than the source buffer holds.
	LengthOutOfBounds {
		length: usize,
		available: usize,
	},

	/// The handshake frame did not even carry the reserved byte.
	EmptyHandshake,
}

impl fmt::Display for ProtocolViolation {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::ShortHeader{available} => write!(f, "frame header needs {} bytes, only {} available", HEADER_SIZE, available),
			Self::FrameTooLarge{declared, max} => write!(f, "declared frame length {} exceeds maximum of {}", declared, max),
			Self::LengthOutOfBounds{length, available} => write!(f, "cannot frame {} bytes out of a {} byte buffer", length, available),
			Self::EmptyHandshake => f.write_str("handshake frame lacks the reserved version byte"),
		}
	}
}

impl std::error::Error for ProtocolViolation {}

/// Frame the first `length` bytes of `payload`.
pub fn frame_len(payload: &[u8], length: usize) -> Result<Bytes, ProtocolViolation> {
	if length > payload.len() {
		return Err(ProtocolViolation::LengthOutOfBounds{length, available: payload.len()})
	}
	let header = match u32::try_from(length) {
		Ok(v) => v,
		Err(_) => return Err(ProtocolViolation::FrameTooLarge{declared: length, max: u32::MAX as usize}),
	};
	let mut buf = BytesMut::with_capacity(length + HEADER_SIZE);
	buf.put_u32(header);
	buf.put_slice(&payload[..length]);
	Ok(buf.freeze())
}

/// Frame the whole of `payload`.
#[inline]
pub fn frame(payload: &[u8]) -> Result<Bytes, ProtocolViolation> {
	frame_len(payload, payload.len())
}

/// Frame a handshake: the reserved version byte followed by `payload`.
pub fn frame_handshake(payload: &[u8]) -> Result<Bytes, ProtocolViolation> {
	let length = payload.len() + 1;
	let header = match u32::try_from(length) {
		Ok(v) => v,
		Err(_) => return Err(ProtocolViolation::FrameTooLarge{declared: length, max: u32::MAX as usize}),
	};
	let mut buf = BytesMut::with_capacity(length + HEADER_SIZE);
	buf.put_u32(header);
	buf.put_u8(HANDSHAKE_VERSION);
	buf.put_slice(payload);
	Ok(buf.freeze())
}

/// Decode the payload length from the first [`HEADER_SIZE`] bytes of `bytes`.
pub fn parse_header(bytes: &[u8]) -> Result<u32, ProtocolViolation> {
	if bytes.len() < HEADER_SIZE {
		return Err(ProtocolViolation::ShortHeader{available: bytes.len()})
	}
	let mut header = [0u8; HEADER_SIZE];
	header.copy_from_slice(&bytes[..HEADER_SIZE]);
	Ok(u32::from_be_bytes(header))
}
