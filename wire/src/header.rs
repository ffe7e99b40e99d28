use crate::additional_headers::{self, AdditionalHeader};
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// Bit reserved in the high (remote) half of a [`SessionId`] to mark the side
/// that is hosting the session. See `DESIGN.md` for why the bit lives in the
/// remote half rather than a dedicated flag.
pub const SESSION_HOST_BIT: u32 = 0x8000_0000;

/// The CDP message type tag carried in every `CommonHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
	Connect,
	Control,
	Session,
	ReliabilityResponse,
	Ack,
}

impl MessageType {
	fn to_u8(self) -> u8 {
		match self {
			MessageType::Connect => 0,
			MessageType::Control => 1,
			MessageType::Session => 2,
			MessageType::ReliabilityResponse => 3,
			MessageType::Ack => 4,
		}
	}

	fn from_u8(v: u8) -> Result<Self> {
		Ok(match v {
			0 => MessageType::Connect,
			1 => MessageType::Control,
			2 => MessageType::Session,
			3 => MessageType::ReliabilityResponse,
			4 => MessageType::Ack,
			other => return Err(Error::UnknownMessageType(other)),
		})
	}
}

bitflags::bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct Flags: u16 {
		const SHOULD_ACK = 0x0001;
		const SESSION_HOST = 0x0002;
	}
}

/// The transport-visible 64-bit session id: `(local << 32) | remote`, with
/// the top bit of `remote` reserved as the host flag (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionId {
	pub local: u32,
	/// The raw remote half, host bit included. Use [`SessionId::remote_id`]
	/// for the masked peer-assigned id.
	pub remote_raw: u32,
}

impl SessionId {
	pub fn new(local: u32, remote: u32) -> Self {
		Self { local, remote_raw: remote }
	}

	/// Build a `SessionId` with the host flag set in the remote half, used
	/// by the side that accepted the session when replying (spec.md §3, §4.3).
	pub fn new_host(local: u32, remote: u32) -> Self {
		Self { local, remote_raw: remote | SESSION_HOST_BIT }
	}

	pub fn remote_id(self) -> u32 {
		self.remote_raw & !SESSION_HOST_BIT
	}

	pub fn is_host(self) -> bool {
		self.remote_raw & SESSION_HOST_BIT != 0
	}

	pub fn to_u64(self) -> u64 {
		(u64::from(self.local) << 32) | u64::from(self.remote_raw)
	}

	pub fn from_u64(v: u64) -> Self {
		Self { local: (v >> 32) as u32, remote_raw: v as u32 }
	}
}

/// The outer frame present on every message (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct CommonHeader {
	pub message_type: MessageType,
	pub flags: Flags,
	pub session_id: SessionId,
	pub sequence_number: u32,
	pub request_id: u32,
	pub channel_id: u64,
	pub fragment_index: u16,
	pub fragment_count: u16,
	pub payload_size: u32,
	pub additional_headers: Vec<AdditionalHeader>,
}

impl CommonHeader {
	pub fn new(message_type: MessageType, session_id: SessionId) -> Self {
		Self {
			message_type,
			flags: Flags::empty(),
			session_id,
			sequence_number: 0,
			request_id: 0,
			channel_id: 0,
			fragment_index: 0,
			fragment_count: 1,
			payload_size: 0,
			additional_headers: Vec::new(),
		}
	}

	pub fn decode(r: &mut Reader) -> Result<Self> {
		let message_type = MessageType::from_u8(r.read_u8()?)?;
		let flags = Flags::from_bits_truncate(r.read_u16()?);
		let session_id = SessionId::from_u64(r.read_u64()?);
		let sequence_number = r.read_u32()?;
		let request_id = r.read_u32()?;
		let channel_id = r.read_u64()?;
		let fragment_index = r.read_u16()?;
		let fragment_count = r.read_u16()?;
		let payload_size = r.read_u32()?;
		let additional_headers = additional_headers::read_table(r)?;

		let header = Self {
			message_type,
			flags,
			session_id,
			sequence_number,
			request_id,
			channel_id,
			fragment_index,
			fragment_count,
			payload_size,
			additional_headers,
		};

		if header.fragment_index >= header.fragment_count {
			tracing::warn!(fragment_index, fragment_count = header.fragment_count, "fragment index is not less than fragment count");
			return Err(Error::UnterminatedHeaderTable);
		}

		Ok(header)
	}

	pub fn encode(&self, w: &mut Writer) {
		w.write_u8(self.message_type.to_u8());
		w.write_u16(self.flags.bits());
		w.write_u64(self.session_id.to_u64());
		w.write_u32(self.sequence_number);
		w.write_u32(self.request_id);
		w.write_u64(self.channel_id);
		w.write_u16(self.fragment_index);
		w.write_u16(self.fragment_count);
		w.write_u32(self.payload_size);
		additional_headers::write_table(w, &self.additional_headers);
	}

	/// Serialize the header with `payload_size` overridden, leaving the
	/// stored value untouched. Used by the cryptor, which needs to MAC the
	/// header as it will appear on the wire (with the final ciphertext
	/// length) before the struct's own `payload_size` field has been
	/// updated.
	pub fn encode_with_payload_size(&self, w: &mut Writer, payload_size: u32) {
		let mut h = self.clone();
		h.payload_size = payload_size;
		h.encode(w);
	}
}

/// Maximum size of a single frame's 16-bit big-endian length prefix (spec.md
/// §6: "16-bit big-endian length prefix followed by a CommonHeader and body").
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Read one length-prefixed frame body (header + body bytes) off the wire.
/// Returns the raw bytes; the caller decodes the `CommonHeader` and, if
/// encrypted, hands the remainder to the cryptor.
pub fn read_frame_bytes(r: &mut Reader) -> Result<&[u8]> {
	let len = r.read_u16()? as usize;
	r.read_bytes(len)
}

/// Frame a fully-serialized header+body with its 16-bit big-endian length
/// prefix.
pub fn frame(body: &[u8]) -> Result<Vec<u8>> {
	if body.len() > MAX_FRAME_LEN {
		return Err(Error::FrameTooLarge { declared: body.len(), limit: MAX_FRAME_LEN });
	}
	let mut out = Vec::with_capacity(body.len() + 2);
	out.extend_from_slice(&(body.len() as u16).to_be_bytes());
	out.extend_from_slice(body);
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_header() -> CommonHeader {
		let mut h = CommonHeader::new(MessageType::Session, SessionId::new(0x0e, 7));
		h.flags = Flags::SHOULD_ACK;
		h.sequence_number = 99;
		h.request_id = 0xdead_beef;
		h.channel_id = 1;
		h.fragment_index = 0;
		h.fragment_count = 3;
		h.payload_size = 123;
		h.additional_headers.push(AdditionalHeader::reply_to(7));
		h.additional_headers.push(AdditionalHeader::new(250, vec![9, 9]));
		h
	}

	#[test]
	fn header_round_trips() {
		let h = sample_header();
		let mut w = Writer::new();
		h.encode(&mut w);

		let bytes = w.into_bytes();
		let mut r = Reader::new(&bytes);
		let decoded = CommonHeader::decode(&mut r).unwrap();

		assert_eq!(decoded, h);
	}

	#[test]
	fn session_id_packs_local_and_remote() {
		let id = SessionId::new(0x0000_000e, 0x8000_0007);
		assert_eq!(id.remote_id(), 7);
		assert!(id.is_host());
		assert_eq!(SessionId::from_u64(id.to_u64()), id);
	}

	#[test]
	fn fragment_index_must_be_less_than_count() {
		let mut h = sample_header();
		h.fragment_index = 3;
		h.fragment_count = 3;

		let mut w = Writer::new();
		h.encode(&mut w);
		let bytes = w.into_bytes();
		let mut r = Reader::new(&bytes);
		assert!(CommonHeader::decode(&mut r).is_err());
	}
}
