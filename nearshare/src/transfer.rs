//! The acceptance handshake between the protocol layer and whatever is
//! hosting it: a [`FileTransferToken`] is handed to the platform the moment a
//! `StartRequest{DataKind=File}` arrives, and the app suspends on its
//! decision before issuing any `FetchDataRequest` (spec.md §6, §4.7).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::{oneshot, watch};

/// A destination for the bytes of an accepted transfer. Implemented by
/// whatever the host passes in — a file on disk, an in-memory buffer for
/// tests, etc. `write_at` may be called out of order; the transfer is never
/// assumed to arrive strictly front-to-back (spec.md §4.7: responses may
/// complete out of sequence).
pub trait TransferSink: Send {
	fn write_at(&mut self, position: u64, data: &[u8]) -> std::io::Result<()>;
}

/// What the platform decided about an offered transfer.
pub enum TransferDecision {
	Accepted(Box<dyn TransferSink>),
	Cancelled,
}

/// Offered to a [`crate::platform::PlatformHandler`] when a file transfer
/// starts. The handler calls [`FileTransferToken::accept`] or
/// [`FileTransferToken::cancel`] from wherever it likes — a UI thread, another
/// task — and the app that issued the token is suspended on
/// [`FileTransferToken::decision`] until it does.
pub struct FileTransferToken {
	pub filename: String,
	pub declared_size: u64,
	decision_tx: Mutex<Option<oneshot::Sender<TransferDecision>>>,
	received: AtomicU64,
	progress_tx: watch::Sender<u64>,
}

impl FileTransferToken {
	pub(crate) fn new(filename: String, declared_size: u64) -> (std::sync::Arc<Self>, oneshot::Receiver<TransferDecision>) {
		let (decision_tx, decision_rx) = oneshot::channel();
		let (progress_tx, _progress_rx) = watch::channel(0);
		let token = std::sync::Arc::new(Self { filename, declared_size, decision_tx: Mutex::new(Some(decision_tx)), received: AtomicU64::new(0), progress_tx });
		(token, decision_rx)
	}

	/// Accept the transfer, providing the sink the incoming bytes are written
	/// to. A no-op if the token was already resolved (the app stopped
	/// waiting, e.g. the session was disposed first).
	pub fn accept(&self, sink: Box<dyn TransferSink>) {
		if let Some(tx) = self.decision_tx.lock().expect("decision mutex is not poisoned").take() {
			let _ = tx.send(TransferDecision::Accepted(sink));
		}
	}

	/// Refuse the transfer. A no-op if already resolved.
	pub fn cancel(&self) {
		if let Some(tx) = self.decision_tx.lock().expect("decision mutex is not poisoned").take() {
			let _ = tx.send(TransferDecision::Cancelled);
		}
	}

	pub fn received_bytes(&self) -> u64 {
		self.received.load(Ordering::Relaxed)
	}

	/// Subscribe to progress updates, fired each time more bytes are written.
	pub fn progress(&self) -> watch::Receiver<u64> {
		self.progress_tx.subscribe()
	}

	pub(crate) fn add_received(&self, n: u64) {
		let total = self.received.fetch_add(n, Ordering::Relaxed) + n;
		let _ = self.progress_tx.send(total);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Sink(Vec<u8>);
	impl TransferSink for Sink {
		fn write_at(&mut self, position: u64, data: &[u8]) -> std::io::Result<()> {
			let end = position as usize + data.len();
			if self.0.len() < end {
				self.0.resize(end, 0);
			}
			self.0[position as usize..end].copy_from_slice(data);
			Ok(())
		}
	}

	#[tokio::test]
	async fn accept_resolves_the_decision_future() {
		let (token, rx) = FileTransferToken::new("a.bin".into(), 10);
		token.accept(Box::new(Sink(Vec::new())));
		match rx.await.unwrap() {
			TransferDecision::Accepted(_) => {}
			TransferDecision::Cancelled => panic!("expected acceptance"),
		}
	}

	#[tokio::test]
	async fn cancel_resolves_with_cancelled() {
		let (token, rx) = FileTransferToken::new("a.bin".into(), 10);
		token.cancel();
		assert!(matches!(rx.await.unwrap(), TransferDecision::Cancelled));
	}

	#[test]
	fn received_bytes_accumulate_and_publish_progress() {
		let (token, _rx) = FileTransferToken::new("a.bin".into(), 10);
		let progress = token.progress();
		token.add_received(4);
		token.add_received(6);
		assert_eq!(token.received_bytes(), 10);
		assert_eq!(*progress.borrow(), 10);
	}
}
