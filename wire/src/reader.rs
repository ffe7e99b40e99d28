use std::io::Cursor;

use byteorder::{ReadBytesExt, BE, LE};

use crate::error::{Error, Result};

/// The sanity limit applied to every length-prefixed field (strings, payloads,
/// additional-header entries). Nothing in the protocol needs a single field
/// larger than this; it exists purely to stop a corrupt or hostile peer from
/// making us allocate gigabytes for a four-byte length prefix.
pub const MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

/// A cursor over a borrowed byte slice with the primitive reads the wire
/// format needs. Every read either advances the cursor and returns `Ok`, or
/// leaves the cursor position unspecified and returns `Err` — callers never
/// continue reading after an error.
pub struct Reader<'a> {
	cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
	pub fn new(bytes: &'a [u8]) -> Self {
		Self { cursor: Cursor::new(bytes) }
	}

	pub fn remaining(&self) -> usize {
		let pos = self.cursor.position() as usize;
		self.cursor.get_ref().len().saturating_sub(pos)
	}

	pub fn is_empty(&self) -> bool {
		self.remaining() == 0
	}

	fn require(&self, wanted: usize) -> Result<()> {
		let available = self.remaining();
		if available < wanted {
			return Err(Error::UnexpectedEof { wanted, available });
		}
		Ok(())
	}

	pub fn read_u8(&mut self) -> Result<u8> {
		self.require(1)?;
		Ok(self.cursor.read_u8().expect("length already checked"))
	}

	pub fn read_u16(&mut self) -> Result<u16> {
		self.require(2)?;
		Ok(self.cursor.read_u16::<LE>().expect("length already checked"))
	}

	pub fn read_u32(&mut self) -> Result<u32> {
		self.require(4)?;
		Ok(self.cursor.read_u32::<LE>().expect("length already checked"))
	}

	pub fn read_u64(&mut self) -> Result<u64> {
		self.require(8)?;
		Ok(self.cursor.read_u64::<LE>().expect("length already checked"))
	}

	pub fn read_u32_be(&mut self) -> Result<u32> {
		self.require(4)?;
		Ok(self.cursor.read_u32::<BE>().expect("length already checked"))
	}

	pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
		self.require(len)?;
		let pos = self.cursor.position() as usize;
		let slice = &self.cursor.get_ref()[pos..pos + len];
		self.cursor.set_position((pos + len) as u64);
		Ok(slice)
	}

	pub fn read_guid(&mut self) -> Result<[u8; 16]> {
		let mut guid = [0u8; 16];
		guid.copy_from_slice(self.read_bytes(16)?);
		Ok(guid)
	}

	/// `u32`-length-prefixed UTF-8 string.
	pub fn read_string_utf8(&mut self) -> Result<String> {
		let len = self.read_length_prefix()?;
		let bytes = self.read_bytes(len)?;
		String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8)
	}

	/// `u32`-byte-length-prefixed UTF-16LE string.
	pub fn read_string_utf16(&mut self) -> Result<String> {
		let len = self.read_length_prefix()?;
		if len % 2 != 0 {
			return Err(Error::InvalidUtf16);
		}
		let bytes = self.read_bytes(len)?;
		let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
		String::from_utf16(&units).map_err(|_| Error::InvalidUtf16)
	}

	/// The "payload" primitive: a 32-bit big-endian length followed by that
	/// many bytes.
	pub fn read_payload(&mut self) -> Result<&'a [u8]> {
		let len = self.read_u32_be()? as usize;
		if len > MAX_FIELD_LEN {
			return Err(Error::FieldTooLarge { declared: len, limit: MAX_FIELD_LEN });
		}
		self.read_bytes(len)
	}

	fn read_length_prefix(&mut self) -> Result<usize> {
		let len = self.read_u32()? as usize;
		if len > MAX_FIELD_LEN {
			return Err(Error::FieldTooLarge { declared: len, limit: MAX_FIELD_LEN });
		}
		Ok(len)
	}

	/// LEB128-style varint: 7 bits of value per byte, low-to-high, with the
	/// high bit set on every byte but the last.
	pub fn read_varint(&mut self) -> Result<u32> {
		let mut value: u32 = 0;
		for i in 0..5 {
			let byte = self.read_u8()?;
			value |= u32::from(byte & 0x7f) << (7 * i);
			if byte & 0x80 == 0 {
				return Ok(value);
			}
		}
		Err(Error::VarintTooLong)
	}
}
