use wire::{Reader, Writer};

use crate::error::{Error, Result};

mod tag {
	pub const U32: u8 = 1;
	pub const U64: u8 = 2;
	pub const STRING: u8 = 3;
	pub const BYTES: u8 = 4;
	pub const LIST_U32: u8 = 5;
	pub const LIST_U64: u8 = 6;
	pub const LIST_STRING: u8 = 7;
	pub const LIST_BYTES: u8 = 8;
}

/// The closed set of value tags a `ValueSet` entry can carry (spec.md §3,
/// §9: "keep the tag enum closed and fail parsing on unknown tags").
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	U32(u32),
	U64(u64),
	String(String),
	Bytes(Vec<u8>),
	ListU32(Vec<u32>),
	ListU64(Vec<u64>),
	ListString(Vec<String>),
	ListBytes(Vec<Vec<u8>>),
}

impl Value {
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::U32(_) => "u32",
			Value::U64(_) => "u64",
			Value::String(_) => "string",
			Value::Bytes(_) => "bytes",
			Value::ListU32(_) => "list<u32>",
			Value::ListU64(_) => "list<u64>",
			Value::ListString(_) => "list<string>",
			Value::ListBytes(_) => "list<bytes>",
		}
	}

	pub(crate) fn decode(r: &mut Reader) -> Result<Self> {
		let t = r.read_u8()?;
		Self::decode_tagged(r, t)
	}

	fn decode_tagged(r: &mut Reader, t: u8) -> Result<Self> {
		Ok(match t {
			tag::U32 => Value::U32(r.read_u32()?),
			tag::U64 => Value::U64(r.read_u64()?),
			tag::STRING => Value::String(r.read_string_utf16()?),
			tag::BYTES => Value::Bytes(r.read_payload()?.to_vec()),
			tag::LIST_U32 => Value::ListU32(Self::decode_list(r, |r| r.read_u32().map_err(Error::from))?),
			tag::LIST_U64 => Value::ListU64(Self::decode_list(r, |r| r.read_u64().map_err(Error::from))?),
			tag::LIST_STRING => Value::ListString(Self::decode_list(r, |r| r.read_string_utf16().map_err(Error::from))?),
			tag::LIST_BYTES => Value::ListBytes(Self::decode_list(r, |r| r.read_payload().map(<[u8]>::to_vec).map_err(Error::from))?),
			other => return Err(Error::UnknownTag(other)),
		})
	}

	fn decode_list<T>(r: &mut Reader, mut elem: impl FnMut(&mut Reader) -> Result<T>) -> Result<Vec<T>> {
		let count = r.read_u32()? as usize;
		let mut out = Vec::with_capacity(count.min(4096));
		for _ in 0..count {
			out.push(elem(r)?);
		}
		Ok(out)
	}

	pub(crate) fn encode(&self, w: &mut Writer) {
		match self {
			Value::U32(v) => {
				w.write_u8(tag::U32);
				w.write_u32(*v);
			}
			Value::U64(v) => {
				w.write_u8(tag::U64);
				w.write_u64(*v);
			}
			Value::String(s) => {
				w.write_u8(tag::STRING);
				w.write_string_utf16(s);
			}
			Value::Bytes(b) => {
				w.write_u8(tag::BYTES);
				w.write_payload(b);
			}
			Value::ListU32(items) => {
				w.write_u8(tag::LIST_U32);
				w.write_u32(items.len() as u32);
				for v in items {
					w.write_u32(*v);
				}
			}
			Value::ListU64(items) => {
				w.write_u8(tag::LIST_U64);
				w.write_u32(items.len() as u32);
				for v in items {
					w.write_u64(*v);
				}
			}
			Value::ListString(items) => {
				w.write_u8(tag::LIST_STRING);
				w.write_u32(items.len() as u32);
				for v in items {
					w.write_string_utf16(v);
				}
			}
			Value::ListBytes(items) => {
				w.write_u8(tag::LIST_BYTES);
				w.write_u32(items.len() as u32);
				for v in items {
					w.write_payload(v);
				}
			}
		}
	}
}
