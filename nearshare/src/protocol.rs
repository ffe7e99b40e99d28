//! The `ValueSet`-encoded vocabulary the Near Share application speaks once a
//! channel is open (spec.md §4.7, §6's "ValueSet payload keys").
//!
//! Every inbound and outbound `Session`-type payload on a Near Share channel
//! has the shape `[PREFIX_LEN opaque bytes][encoded ValueSet]` — the leading
//! bytes are a correlation vector this layer treats as transparent (spec.md
//! §4.7) and must echo unchanged on every reply.

/// Length, in bytes, of the opaque correlation-vector prefix carried by
/// every Near Share application message.
pub const PREFIX_LEN: usize = 12;

/// Values of the `"ControlMessage"` key, selecting which of the fixed
/// exchanges a `ValueSet` payload carries (spec.md §4.7).
pub mod control_message {
	pub const START_REQUEST: u32 = 1;
	pub const START_RESPONSE: u32 = 2;
	pub const FETCH_DATA_REQUEST: u32 = 3;
	pub const FETCH_DATA_RESPONSE: u32 = 4;
}

/// Values of the `"DataKind"` key carried by `StartRequest` (spec.md §4.7).
pub mod data_kind {
	pub const FILE: u32 = 1;
	pub const URI: u32 = 2;
}

pub mod key {
	pub const CONTROL_MESSAGE: &str = "ControlMessage";
	pub const DATA_KIND: &str = "DataKind";
	pub const FILE_NAMES: &str = "FileNames";
	pub const BYTES_TO_SEND: &str = "BytesToSend";
	pub const URI: &str = "Uri";
	pub const BLOB_POSITION: &str = "BlobPosition";
	pub const BLOB_SIZE: &str = "BlobSize";
	pub const DATA_BLOB: &str = "DataBlob";
	pub const CONTENT_ID: &str = "ContentId";
}
