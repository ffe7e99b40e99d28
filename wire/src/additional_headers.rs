use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// Tags recognized by this implementation. Any tag not listed here is still
/// round-tripped faithfully — `AdditionalHeader::tag` is a plain `u8`, not
/// this enum, so an unknown tag observed on read is written back byte-for-
/// byte on write.
pub mod tag {
	pub const END: u8 = 0;
	pub const REPLY_TO_ID: u8 = 1;
	pub const CORRELATION_VECTOR: u8 = 2;
	/// The literal tag required by `StartChannelResponse` for interop (§4.5,
	/// §6): value bytes are always `30 00 00 01`.
	pub const START_CHANNEL_COMPAT: u8 = 129;
}

/// One `{type, length, bytes}` entry in the additional-headers table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalHeader {
	pub tag: u8,
	pub bytes: Vec<u8>,
}

impl AdditionalHeader {
	pub fn new(tag: u8, bytes: impl Into<Vec<u8>>) -> Self {
		Self { tag, bytes: bytes.into() }
	}

	pub fn reply_to(request_id: u32) -> Self {
		Self::new(tag::REPLY_TO_ID, request_id.to_le_bytes())
	}

	pub fn start_channel_compat() -> Self {
		Self::new(tag::START_CHANNEL_COMPAT, [0x30, 0x00, 0x00, 0x01])
	}
}

/// Read the additional-headers table: a sequence of `{tag: u8, length:
/// varint, bytes}` entries terminated by a `tag == END` sentinel (which
/// carries no length or bytes of its own).
pub fn read_table(r: &mut Reader) -> Result<Vec<AdditionalHeader>> {
	let mut headers = Vec::new();

	loop {
		if r.is_empty() {
			return Err(Error::UnterminatedHeaderTable);
		}

		let t = r.read_u8()?;
		if t == tag::END {
			return Ok(headers);
		}

		let len = r.read_varint()? as usize;
		if len > crate::reader::MAX_FIELD_LEN {
			return Err(Error::FieldTooLarge { declared: len, limit: crate::reader::MAX_FIELD_LEN });
		}
		let bytes = r.read_bytes(len)?.to_vec();
		headers.push(AdditionalHeader { tag: t, bytes });
	}
}

/// Write the additional-headers table, preserving entry order (the table is
/// a list, not a map — see `DESIGN.md`'s note on `ReplyToId` ordering) and
/// terminating with the `END` sentinel.
pub fn write_table(w: &mut Writer, headers: &[AdditionalHeader]) {
	for h in headers {
		w.write_u8(h.tag);
		w.write_varint(h.bytes.len() as u32);
		w.write_bytes(&h.bytes);
	}
	w.write_u8(tag::END);
}

/// Remove the first header with the given tag, returning its bytes if present.
pub fn take(headers: &mut Vec<AdditionalHeader>, tag: u8) -> Option<Vec<u8>> {
	let idx = headers.iter().position(|h| h.tag == tag)?;
	Some(headers.remove(idx).bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_known_and_unknown_tags() {
		let headers = vec![AdditionalHeader::reply_to(42), AdditionalHeader::new(200, vec![1, 2, 3]), AdditionalHeader::start_channel_compat()];

		let mut w = Writer::new();
		write_table(&mut w, &headers);

		let bytes = w.into_bytes();
		let mut r = Reader::new(&bytes);
		let parsed = read_table(&mut r).unwrap();

		assert_eq!(parsed, headers);
		assert!(r.is_empty());
	}

	#[test]
	fn missing_terminator_is_an_error() {
		let mut w = Writer::new();
		w.write_u8(5);
		w.write_varint(2);
		w.write_bytes(&[1, 2]);
		// no END sentinel

		let bytes = w.into_bytes();
		let mut r = Reader::new(&bytes);
		assert_eq!(read_table(&mut r), Err(Error::UnterminatedHeaderTable));
	}

	#[test]
	fn decodes_a_hand_built_multi_byte_varint_length() {
		// tag=7, length=300 as a two-byte varint (300 = 0b1_0010_1100):
		// low 7 bits 0101100 with continuation set (0xAC), remaining bits 10 (0x02).
		let mut bytes = vec![7, 0xAC, 0x02];
		bytes.extend(std::iter::repeat(0xAB).take(300));
		bytes.push(tag::END);

		let mut r = Reader::new(&bytes);
		let parsed = read_table(&mut r).unwrap();

		assert_eq!(parsed.len(), 1);
		assert_eq!(parsed[0].tag, 7);
		assert_eq!(parsed[0].bytes, vec![0xAB; 300]);
		assert!(r.is_empty());
	}
}
