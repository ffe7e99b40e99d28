//! Framing, primitive codec, and the additional-headers table for the CDP
//! Near Share wire protocol (spec §4.1).
//!
//! This crate is the bottom layer of the stack: it knows nothing about
//! sessions, encryption, or the property-bag application payload. It only
//! knows how to turn bytes into a [`header::CommonHeader`] and back.

pub mod additional_headers;
pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

pub use additional_headers::AdditionalHeader;
pub use error::{Error, Result};
pub use header::{frame, read_frame_bytes, CommonHeader, Flags, MessageType, SessionId, MAX_FRAME_LEN};
pub use reader::Reader;
pub use writer::Writer;
