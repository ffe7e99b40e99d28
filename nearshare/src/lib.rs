//! The Near Share file/URI receiver application and the transport host loop
//! that drives it (spec.md §2 items 7, 9's ambient transport loop supplement).
//!
//! Everything below `near_core` — the session/channel state machine, the
//! wire codec, the cryptor — is generic CDP plumbing that knows nothing
//! about files or URIs. This crate is where that plumbing becomes Near
//! Share: a [`platform::PlatformHandler`] hands us a transport connection
//! (via [`host::Host::serve`]), and we hand the platform back URIs and file
//! transfers as they complete.

pub mod app;
pub mod config;
pub mod error;
pub mod host;
pub mod platform;
pub mod protocol;
pub mod transfer;

pub use app::{NearShareApp, NearShareAppFactory, APP_ID};
pub use config::Config;
pub use error::{HostError, Result};
pub use host::Host;
pub use platform::{LogLevel, PlatformHandler};
pub use transfer::{FileTransferToken, TransferDecision, TransferSink};
