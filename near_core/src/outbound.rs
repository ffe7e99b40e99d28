use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::mpsc;
use wire::{AdditionalHeader, CommonHeader, Flags, MessageType, SessionId, Writer};

use crate::error::{Result, SessionError};

/// The write side of an established session, shared by the session's
/// dispatch loop and every channel's application instance (spec.md §9: the
/// cyclic ownership between a session and the channels it hosts is broken by
/// handing channels this handle instead of a reference back to the session
/// itself, the same shape as the teacher's `Fwd<Slice>` write-back closure).
///
/// Only exists once key agreement has completed — a [`crate::Session`] holds
/// a `CommonHeader`-unencrypted path for `Connect`/`ConnectResponse` itself,
/// and constructs a `SessionOutbound` right after, so every message this type
/// sends is encrypted (spec.md §4.2).
pub struct SessionOutbound {
	session_id: SessionId,
	fragment_size: usize,
	next_sequence: AtomicU32,
	cryptor: crypto::Cryptor,
	sink: mpsc::UnboundedSender<Vec<u8>>,
}

impl SessionOutbound {
	pub fn new(session_id: SessionId, fragment_size: u16, cryptor: crypto::Cryptor, sink: mpsc::UnboundedSender<Vec<u8>>) -> Self {
		Self { session_id, fragment_size: (fragment_size as usize).max(1), next_sequence: AtomicU32::new(0), cryptor, sink }
	}

	/// Send application data on a channel (spec.md §3: `Session`-type
	/// message).
	pub fn send_session_message(&self, channel_id: u64, body: &[u8]) -> Result<()> {
		self.send(MessageType::Session, Flags::empty(), 0, channel_id, Vec::new(), body)
	}

	/// Send a `Control`-type reply, optionally carrying the `ReplyTo`
	/// additional header that correlates it with the request (spec.md §4.5).
	pub fn send_control(&self, request_id: u32, additional_headers: Vec<AdditionalHeader>, body: &[u8]) -> Result<()> {
		self.send(MessageType::Control, Flags::empty(), request_id, 0, additional_headers, body)
	}

	/// Acknowledge a message that arrived with `ShouldAck` set (spec.md §4.7).
	pub fn send_ack(&self, request_id: u32) -> Result<()> {
		self.send(MessageType::Ack, Flags::empty(), request_id, 0, Vec::new(), &[])
	}

	fn send(&self, message_type: MessageType, flags: Flags, request_id: u32, channel_id: u64, additional_headers: Vec<AdditionalHeader>, body: &[u8]) -> Result<()> {
		let fragment_count = ((body.len() + self.fragment_size - 1) / self.fragment_size).max(1) as u16;
		let sequence_number = self.next_sequence.fetch_add(1, Ordering::Relaxed);

		for fragment_index in 0..fragment_count {
			let start = fragment_index as usize * self.fragment_size;
			let end = (start + self.fragment_size).min(body.len());
			let chunk = &body[start..end];

			let mut header = CommonHeader::new(message_type, self.session_id);
			header.flags = flags;
			header.sequence_number = sequence_number;
			header.request_id = request_id;
			header.channel_id = channel_id;
			header.fragment_index = fragment_index;
			header.fragment_count = fragment_count;
			if fragment_index == 0 {
				header.additional_headers = additional_headers.clone();
			}
			header.payload_size = crypto::Cryptor::sealed_len(chunk.len()) as u32;

			let sealed = self.cryptor.encrypt(&header, chunk);

			let mut w = Writer::new();
			header.encode(&mut w);
			w.write_bytes(&sealed);

			let frame = wire::frame(w.as_slice())?;
			self.sink.send(frame).map_err(|_| SessionError::ProtocolViolation("outbound sink is closed"))?;
		}

		Ok(())
	}
}
