use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
	#[error("remote public point is not a valid NIST P-256 point")]
	InvalidPublicPoint,

	#[error("HMAC verification failed: body or header was tampered with")]
	IntegrityFailure,

	#[error("ciphertext was not a multiple of the AES block size, or padding was invalid")]
	InvalidPadding,

	#[error("encrypted body was shorter than the HMAC tag")]
	BodyTooShort,

	#[error("device authentication thumbprint did not match")]
	ThumbprintMismatch,
}

pub type Result<T> = core::result::Result<T, Error>;
