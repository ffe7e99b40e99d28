//! The external collaborator this crate hands user-visible events to (spec.md
//! §6: "Platform handler"). Everything out of scope by spec.md §1 — the
//! Android UI shell, notification plumbing, certificate storage — lives
//! behind this trait; this crate only ever calls it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::transfer::FileTransferToken;

/// Severity of a [`PlatformHandler::log`] call, matching the granularity
/// spec.md §4.8 instruments (`debug` routine progress, `warn` recoverable
/// anomalies, `error` immediately before a fatal disposal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
	Debug,
	Info,
	Warn,
	Error,
}

/// The capability set spec.md §6 requires of the host application: logging,
/// URI delivery, and file-transfer acceptance. Implementations are shared by
/// every session and application instance for the process lifetime (spec.md
/// §3: "The platform handler is shared ... for the process lifetime"), so
/// this trait is `Send + Sync`.
#[async_trait]
pub trait PlatformHandler: Send + Sync {
	fn log(&self, level: LogLevel, message: &str);

	/// A single-shot URI was received and requires no further action from
	/// this crate (spec.md §4.7: `StartRequest{DataKind=Uri}`).
	async fn on_received_uri(&self, device_name: &str, uri: &str);

	/// A file transfer was offered. The handler calls [`FileTransferToken::accept`]
	/// or [`FileTransferToken::cancel`] — from this call, from another task, or
	/// from a UI thread entirely — and the application that issued the token
	/// suspends on the decision (spec.md §4.7, §5).
	async fn on_file_transfer(&self, token: Arc<FileTransferToken>);
}
