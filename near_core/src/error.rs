use thiserror::Error;

/// Every way a session can fail, named after spec.md §7's error kinds.
/// Every variant here is fatal to the session that produced it — the
/// protocol has no per-message recovery (spec.md §7).
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("malformed frame or value: {0}")]
	Parse(#[from] wire::Error),

	#[error(transparent)]
	ValueSet(#[from] valueset::Error),

	#[error("HMAC verification failed")]
	Integrity(#[from] crypto::Error),

	#[error("device authentication thumbprint did not match")]
	Auth,

	#[error("no session is registered under local id {0}")]
	UnknownSession(u32),

	#[error("frame's remote id {got} did not match the registered remote id {expected} for session {session}")]
	WrongRemote { session: u32, expected: u32, got: u32 },

	#[error("frame's device address did not match the session's registered device")]
	WrongDevice,

	#[error("session {0} has already been disposed")]
	Disposed(u32),

	#[error("protocol violation: {0}")]
	ProtocolViolation(&'static str),

	#[error("not implemented: {0}")]
	NotImplemented(&'static str),

	#[error("message type {0:?} is not valid in the current session state")]
	UnexpectedMessage(wire::MessageType),

	#[error("unknown channel id {0}")]
	UnknownChannel(u64),

	#[error("unknown application id {0:?}")]
	UnknownApplication(String),

	#[error("unrecognized control message kind {0}")]
	UnknownControlKind(u8),
}

pub type Result<T> = core::result::Result<T, SessionError>;
