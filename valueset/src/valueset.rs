use indexmap::IndexMap;
use wire::{Reader, Writer};

use crate::error::{Error, Result};
use crate::value::Value;

/// Ordered key/value property bag (spec.md §3: "ValueSet"). Ordering is
/// preserved on the wire (`IndexMap` keeps insertion order) but is
/// semantically irrelevant to consumers — lookups are always by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSet {
	entries: IndexMap<String, Value>,
}

impl ValueSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
		self.entries.insert(key.into(), value);
		self
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.entries.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	pub fn decode(r: &mut Reader) -> Result<Self> {
		let count = r.read_u32()? as usize;
		let mut entries = IndexMap::with_capacity(count.min(4096));
		for _ in 0..count {
			let key = r.read_string_utf8()?;
			let value = Value::decode(r)?;
			entries.insert(key, value);
		}
		Ok(Self { entries })
	}

	pub fn encode(&self, w: &mut Writer) {
		w.write_u32(self.entries.len() as u32);
		for (key, value) in &self.entries {
			w.write_string_utf8(key);
			value.encode(w);
		}
	}

	fn require(&self, key: &str) -> Result<&Value> {
		self.entries.get(key).ok_or_else(|| Error::MissingKey { key: key.to_owned() })
	}

	pub fn get_u32(&self, key: &str) -> Result<u32> {
		match self.require(key)? {
			Value::U32(v) => Ok(*v),
			other => Err(mismatch(key, "u32", other)),
		}
	}

	pub fn get_u64(&self, key: &str) -> Result<u64> {
		match self.require(key)? {
			Value::U64(v) => Ok(*v),
			other => Err(mismatch(key, "u64", other)),
		}
	}

	pub fn get_string(&self, key: &str) -> Result<&str> {
		match self.require(key)? {
			Value::String(v) => Ok(v.as_str()),
			other => Err(mismatch(key, "string", other)),
		}
	}

	pub fn get_bytes(&self, key: &str) -> Result<&[u8]> {
		match self.require(key)? {
			Value::Bytes(v) => Ok(v.as_slice()),
			other => Err(mismatch(key, "bytes", other)),
		}
	}

	pub fn get_list_string(&self, key: &str) -> Result<&[String]> {
		match self.require(key)? {
			Value::ListString(v) => Ok(v.as_slice()),
			other => Err(mismatch(key, "list<string>", other)),
		}
	}
}

fn mismatch(key: &str, expected: &'static str, actual: &Value) -> Error {
	Error::TypeMismatch { key: key.to_owned(), expected, actual: actual.type_name() }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_preserving_order() {
		let mut vs = ValueSet::new();
		vs.insert("ControlMessage", Value::U32(1));
		vs.insert("FileNames", Value::ListString(vec!["a.bin".into(), "b.bin".into()]));
		vs.insert("BytesToSend", Value::U64(250_000));
		vs.insert("Blob", Value::Bytes(vec![1, 2, 3, 4]));

		let mut w = Writer::new();
		vs.encode(&mut w);
		let bytes = w.into_bytes();

		let mut r = Reader::new(&bytes);
		let decoded = ValueSet::decode(&mut r).unwrap();

		assert_eq!(decoded, vs);
		assert_eq!(decoded.entries.keys().collect::<Vec<_>>(), vs.entries.keys().collect::<Vec<_>>());
	}

	#[test]
	fn typed_accessors_fail_on_mismatch() {
		let mut vs = ValueSet::new();
		vs.insert("BytesToSend", Value::U64(1));

		assert_eq!(vs.get_u32("BytesToSend"), Err(Error::TypeMismatch { key: "BytesToSend".into(), expected: "u32", actual: "u64" }));
	}

	#[test]
	fn missing_key_is_distinct_from_mismatch() {
		let vs = ValueSet::new();
		assert_eq!(vs.get_u32("Nope"), Err(Error::MissingKey { key: "Nope".into() }));
	}
}
