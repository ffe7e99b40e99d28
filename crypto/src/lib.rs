//! ECDH key agreement over NIST P-256, the AES-128-CBC+HMAC-SHA256 session
//! cryptor, and device-authentication thumbprint verification (spec.md §4.2,
//! §4.3, §6).

pub mod cryptor;
pub mod error;
pub mod keyagreement;
pub mod thumbprint;

pub use cryptor::Cryptor;
pub use error::{Error, Result};
pub use keyagreement::{LocalKeyMaterial, SessionKeys};
