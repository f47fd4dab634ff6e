/*!
# Frame reassembly

The receive pipeline reads exactly [`HEADER_SIZE`] header bytes, then exactly
the number of payload bytes the header declares. Stream sockets may hand out
fewer bytes than asked for, so both phases accumulate across as many reads as
it takes.

Each call to [`ReceivePipeline::read_from`] performs at most one read and
only mutates the pipeline after that read completed. This makes it safe to
use as a `select!` branch: dropping the future loses no data.
*/
use std::mem;

use bytes::BytesMut;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{self, HEADER_SIZE, ProtocolViolation};
use crate::error::TransportError;
use crate::message::FramedMessage;


enum Phase {
	Header{
		filled: usize,
	},
	Body{
		buf: BytesMut,
		position: usize,
	},
}

pub(super) struct ReceivePipeline {
	max_frame_size: usize,
	header: [u8; HEADER_SIZE],
	phase: Phase,
}

impl ReceivePipeline {
	pub(super) fn new(max_frame_size: usize) -> Self {
		Self{
			max_frame_size,
			header: [0u8; HEADER_SIZE],
			phase: Phase::Header{filled: 0},
		}
	}

	/// Bytes still missing from the frame currently being received.
	///
	/// Zero between frames.
	pub(super) fn pending(&self) -> usize {
		match self.phase {
			Phase::Header{filled: 0} => 0,
			Phase::Header{filled} => HEADER_SIZE - filled,
			Phase::Body{ref buf, position} => buf.len() - position,
		}
	}

	/// The slice the next read should fill.
	///
	/// Never spans past the end of the current phase, so a read never
	/// consumes bytes of the following frame.
	fn want(&mut self) -> &mut [u8] {
		match self.phase {
			Phase::Header{filled} => &mut self.header[filled..],
			Phase::Body{ref mut buf, position} => &mut buf[position..],
		}
	}

	/// Account for `n` bytes which were just written into [`Self::want`].
	///
	/// Returns the completed message once the whole payload has arrived.
	fn complete(&mut self, n: usize) -> Result<Option<FramedMessage>, ProtocolViolation> {
		match self.phase {
			Phase::Header{ref mut filled} => {
				*filled += n;
				if *filled < HEADER_SIZE {
					return Ok(None)
				}
				let length = codec::parse_header(&self.header)? as usize;
				if length > self.max_frame_size {
					return Err(ProtocolViolation::FrameTooLarge{declared: length, max: self.max_frame_size})
				}
				if length == 0 {
					self.phase = Phase::Header{filled: 0};
					return Ok(Some(FramedMessage::empty()))
				}
				self.phase = Phase::Body{
					buf: BytesMut::zeroed(length),
					position: 0,
				};
				Ok(None)
			},
			Phase::Body{ref buf, ref mut position} => {
				*position += n;
				if *position < buf.len() {
					return Ok(None)
				}
				match mem::replace(&mut self.phase, Phase::Header{filled: 0}) {
					Phase::Body{buf, ..} => Ok(Some(FramedMessage::new(buf.freeze()))),
					Phase::Header{..} => unreachable!(),
				}
			},
		}
	}

	/// Perform one read from `src` and advance the reassembly.
	///
	/// A zero-length read (orderly close by the peer) is reported as
	/// [`TransportError::Closed`], never as a partial message.
	pub(super) async fn read_from<R: AsyncRead + Unpin>(&mut self, src: &mut R) -> Result<Option<FramedMessage>, TransportError> {
		let n = match src.read(self.want()).await {
			Ok(n) => n,
			Err(e) => return Err(TransportError::Io(e)),
		};
		if n == 0 {
			return Err(TransportError::Closed{pending: self.pending()})
		}
		Ok(self.complete(n)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::codec::{frame, MAX_FRAME_SIZE};

	/// Feed `wire` into the pipeline in chunks of the given sizes (cycled).
	fn feed(pipeline: &mut ReceivePipeline, wire: &[u8], chunks: &[usize]) -> Result<Vec<FramedMessage>, ProtocolViolation> {
		let mut out = Vec::new();
		let mut pos = 0;
		let mut i = 0;
		while pos < wire.len() {
			let want = pipeline.want();
			let n = chunks[i % chunks.len()].min(want.len()).min(wire.len() - pos);
			want[..n].copy_from_slice(&wire[pos..pos + n]);
			pos += n;
			i += 1;
			if let Some(msg) = pipeline.complete(n)? {
				out.push(msg);
			}
		}
		Ok(out)
	}

	fn wire_of(payloads: &[&[u8]]) -> Vec<u8> {
		let mut wire = Vec::new();
		for p in payloads {
			wire.extend_from_slice(&frame(p).unwrap());
		}
		wire
	}

	#[test]
	fn single_chunk() {
		let mut pipeline = ReceivePipeline::new(MAX_FRAME_SIZE);
		let msgs = feed(&mut pipeline, &wire_of(&[b"hello"]), &[usize::MAX]).unwrap();
		assert_eq!(msgs.len(), 1);
		assert_eq!(msgs[0].payload(), b"hello");
		assert_eq!(msgs[0].position(), 0);
		assert_eq!(pipeline.pending(), 0);
	}

	#[test]
	fn fragmentation_does_not_change_result() {
		let payloads: Vec<Vec<u8>> = (0..20usize)
			.map(|i| (0..(i * 37) % 300).map(|j| (i + j) as u8).collect())
			.collect();
		let refs: Vec<&[u8]> = payloads.iter().map(|p| &p[..]).collect();
		let wire = wire_of(&refs);

		for chunks in [&[1usize][..], &[2], &[3, 1, 7], &[5, 13, 1, 64], &[4096]].iter() {
			let mut pipeline = ReceivePipeline::new(MAX_FRAME_SIZE);
			let msgs = feed(&mut pipeline, &wire, chunks).unwrap();
			let got: Vec<&[u8]> = msgs.iter().map(|m| m.payload()).collect();
			assert_eq!(got, refs, "chunking {:?}", chunks);
		}
	}

	#[test]
	fn zero_length_frame_completes_without_body() {
		let mut pipeline = ReceivePipeline::new(MAX_FRAME_SIZE);
		let msgs = feed(&mut pipeline, &wire_of(&[b"", b"x", b""]), &[1]).unwrap();
		assert_eq!(msgs.len(), 3);
		assert_eq!(msgs[0].length(), 0);
		assert_eq!(msgs[1].payload(), b"x");
		assert_eq!(msgs[2].length(), 0);
	}

	#[test]
	fn oversized_frame_is_rejected_before_allocation() {
		let mut pipeline = ReceivePipeline::new(16);
		let err = feed(&mut pipeline, &[0, 0, 0, 17], &[4]).unwrap_err();
		assert_eq!(err, ProtocolViolation::FrameTooLarge{declared: 17, max: 16});

		let mut pipeline = ReceivePipeline::new(MAX_FRAME_SIZE);
		let err = feed(&mut pipeline, &[0xff, 0xff, 0xff, 0xff], &[4]).unwrap_err();
		assert_eq!(err, ProtocolViolation::FrameTooLarge{declared: u32::MAX as usize, max: MAX_FRAME_SIZE});
	}

	#[test]
	fn pending_tracks_partial_frames() {
		let mut pipeline = ReceivePipeline::new(MAX_FRAME_SIZE);
		assert!(feed(&mut pipeline, &[0, 0], &[2]).unwrap().is_empty());
		assert_eq!(pipeline.pending(), 2);
		assert!(feed(&mut pipeline, &[0, 5, b'a', b'b', b'c'], &[5]).unwrap().is_empty());
		assert_eq!(pipeline.pending(), 2);
	}

	#[tokio::test]
	async fn read_from_reports_truncated_body() {
		let mut wire: &[u8] = &[0, 0, 0, 5, b'a', b'b', b'c'];
		let mut pipeline = ReceivePipeline::new(MAX_FRAME_SIZE);
		let mut delivered = 0;
		let err = loop {
			match pipeline.read_from(&mut wire).await {
				Ok(Some(_)) => delivered += 1,
				Ok(None) => (),
				Err(e) => break e,
			}
		};
		assert_eq!(delivered, 0);
		match err {
			TransportError::Closed{pending} => assert_eq!(pending, 2),
			other => panic!("unexpected error: {}", other),
		}
	}

	#[tokio::test]
	async fn read_from_reports_clean_close_between_frames() {
		let wire = wire_of(&[b"ab"]);
		let mut src: &[u8] = &wire;
		let mut pipeline = ReceivePipeline::new(MAX_FRAME_SIZE);
		let mut delivered = Vec::new();
		let err = loop {
			match pipeline.read_from(&mut src).await {
				Ok(Some(msg)) => delivered.push(msg),
				Ok(None) => (),
				Err(e) => break e,
			}
		};
		assert_eq!(delivered.len(), 1);
		assert_eq!(delivered[0].payload(), b"ab");
		match err {
			TransportError::Closed{pending} => assert_eq!(pending, 0),
			other => panic!("unexpected error: {}", other),
		}
	}
}
