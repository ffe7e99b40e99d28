use thiserror::Error;

/// Failures that can occur while decoding or encoding a wire-level value.
///
/// Kept narrow and mechanical on purpose: anything that requires protocol
/// *meaning* (unexpected message type for the current session state, replay,
/// auth failure) belongs to `near_core::SessionError`, not here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
	#[error("unexpected end of buffer: wanted {wanted} bytes, {available} remained")]
	UnexpectedEof { wanted: usize, available: usize },

	#[error("string field was not valid UTF-8")]
	InvalidUtf8,

	#[error("string field was not valid UTF-16")]
	InvalidUtf16,

	#[error("length-prefixed field declared {declared} bytes, which exceeds the {limit} byte sanity limit")]
	FieldTooLarge { declared: usize, limit: usize },

	#[error("additional header table was not terminated by an End entry before the buffer ran out")]
	UnterminatedHeaderTable,

	#[error("frame declared payload size {declared}, but {actual} bytes of body were written")]
	PayloadSizeMismatch { declared: u32, actual: u32 },

	#[error("frame length prefix {declared} exceeds the {limit} byte sanity limit")]
	FrameTooLarge { declared: usize, limit: usize },

	#[error("unknown message type tag {0}")]
	UnknownMessageType(u8),

	#[error("varint did not terminate within 5 bytes")]
	VarintTooLong,
}

pub type Result<T> = core::result::Result<T, Error>;
