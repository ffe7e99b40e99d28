use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
	#[error(transparent)]
	Wire(#[from] wire::Error),

	#[error("unknown ValueSet tag {0}")]
	UnknownTag(u8),

	#[error("key {key:?} is missing from the ValueSet")]
	MissingKey { key: String },

	#[error("key {key:?} has tag {actual:?}, expected {expected:?}")]
	TypeMismatch { key: String, expected: &'static str, actual: &'static str },

	#[error("list elements were not all the same tag")]
	HeterogeneousList,
}

pub type Result<T> = core::result::Result<T, Error>;
