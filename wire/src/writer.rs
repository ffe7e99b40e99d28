use byteorder::{WriteBytesExt, BE, LE};

use crate::error::Result;

/// An append-only byte buffer with the primitive writes the wire format
/// needs, plus reservation support for fields (like `CommonHeader::PayloadSize`)
/// that must be back-patched once their body has been serialized.
#[derive(Default)]
pub struct Writer {
	buf: Vec<u8>,
}

impl Writer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.buf
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.buf
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	pub fn write_u8(&mut self, v: u8) {
		self.buf.write_u8(v).expect("writing to a Vec cannot fail");
	}

	pub fn write_u16(&mut self, v: u16) {
		self.buf.write_u16::<LE>(v).expect("writing to a Vec cannot fail");
	}

	pub fn write_u32(&mut self, v: u32) {
		self.buf.write_u32::<LE>(v).expect("writing to a Vec cannot fail");
	}

	pub fn write_u64(&mut self, v: u64) {
		self.buf.write_u64::<LE>(v).expect("writing to a Vec cannot fail");
	}

	pub fn write_u32_be(&mut self, v: u32) {
		self.buf.write_u32::<BE>(v).expect("writing to a Vec cannot fail");
	}

	pub fn write_bytes(&mut self, bytes: &[u8]) {
		self.buf.extend_from_slice(bytes);
	}

	pub fn write_guid(&mut self, guid: &[u8; 16]) {
		self.write_bytes(guid);
	}

	pub fn write_string_utf8(&mut self, s: &str) {
		self.write_u32(s.len() as u32);
		self.write_bytes(s.as_bytes());
	}

	pub fn write_string_utf16(&mut self, s: &str) {
		let units: Vec<u8> = s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
		self.write_u32(units.len() as u32);
		self.write_bytes(&units);
	}

	pub fn write_payload(&mut self, bytes: &[u8]) {
		self.write_u32_be(bytes.len() as u32);
		self.write_bytes(bytes);
	}

	/// LEB128-style varint: 7 bits of value per byte, low-to-high, with the
	/// high bit set on every byte but the last.
	pub fn write_varint(&mut self, mut v: u32) {
		loop {
			let byte = (v & 0x7f) as u8;
			v >>= 7;
			if v == 0 {
				self.write_u8(byte);
				return;
			}
			self.write_u8(byte | 0x80);
		}
	}

	/// Reserve four bytes for a `u32` field to be filled in later via
	/// [`Writer::backpatch_u32`], returning the offset to pass back.
	pub fn reserve_u32(&mut self) -> usize {
		let at = self.buf.len();
		self.write_u32(0);
		at
	}

	pub fn backpatch_u32(&mut self, at: usize, v: u32) {
		self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
	}

	/// Serialize `body` into a scratch buffer via `f`, and return both the
	/// produced bytes and their length. Used by frame writers that need to
	/// know the body length before committing it to the outer buffer (e.g.
	/// to compute an HMAC over header-with-size || ciphertext).
	pub fn scratch(f: impl FnOnce(&mut Writer) -> Result<()>) -> Result<Vec<u8>> {
		let mut w = Writer::new();
		f(&mut w)?;
		Ok(w.into_bytes())
	}
}
