//! The top-level error type returned by the transport host loop (spec.md
//! §4.9's supplement), composing the per-layer errors the way
//! `near_core::SessionError` composes `wire`/`crypto`/`valueset` below it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
	#[error(transparent)]
	Session(#[from] near_core::SessionError),

	#[error("transport I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Frame(#[from] wire::Error),
}

pub type Result<T> = core::result::Result<T, HostError>;
