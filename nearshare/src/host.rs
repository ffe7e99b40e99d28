//! Owns the tokio runtime interaction for one transport connection (spec.md
//! §4.9's supplement): reads length-prefixed frames off an `AsyncRead` half,
//! looks up or creates a session, and dispatches per spec.md §5's
//! concurrency model — Connect/Control messages handled inline, completed
//! Session messages handed to a background task so the reader never blocks
//! on application logic.
//!
//! This is the direct analogue of the teacher's `runtime` crate owning the
//! reactor in one place and handing work off to callbacks, generalized from
//! a raw-socket UDP loop to a framed async byte stream.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use near_core::{AppFactory, Dispatch, DeviceAddress, SessionRegistry};
use wire::{CommonHeader, Reader};

use crate::app::NearShareAppFactory;
use crate::config::Config;
use crate::error::{HostError, Result};
use crate::platform::{LogLevel, PlatformHandler};

/// Process-wide (per spec.md §9: explicitly constructed, not ambient) host
/// for the Near Share receiver core. One `Host` can serve many concurrent
/// transport connections; its [`SessionRegistry`] is the single process-wide
/// map spec.md §4.4 describes.
pub struct Host {
	registry: Mutex<SessionRegistry>,
	local_certificate: Vec<u8>,
	platform: Arc<dyn PlatformHandler>,
	config: Config,
}

impl Host {
	pub fn new(platform: Arc<dyn PlatformHandler>, local_certificate: Vec<u8>, config: Config) -> Arc<Self> {
		Arc::new(Self { registry: Mutex::new(SessionRegistry::new()), local_certificate, platform, config })
	}

	pub fn session_count(&self) -> usize {
		self.registry.lock().expect("session registry mutex is not poisoned").len()
	}

	/// Serve one transport connection to completion: read frames until the
	/// peer disconnects or a fatal session error is hit, then close. `device`
	/// identifies the peer the way the (out-of-scope) transport names it —
	/// a Bluetooth RFCOMM socket's remote MAC address in the reference
	/// deployment (spec.md §1, §3).
	pub async fn serve<R, W>(self: &Arc<Self>, device: DeviceAddress, mut reader: R, writer: W) -> Result<()>
	where
		R: AsyncRead + Unpin + Send,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (raw_tx, raw_rx) = mpsc::unbounded_channel::<Vec<u8>>();
		let writer_task = tokio::spawn(drive_writer(writer, raw_rx));

		let app_factory: Arc<dyn AppFactory> = Arc::new(NearShareAppFactory::new(self.platform.clone(), device.clone(), self.config.clone()));

		loop {
			let frame = match read_frame(&mut reader).await {
				Ok(Some(frame)) => frame,
				Ok(None) => {
					tracing::debug!(device = %device, "transport closed by peer");
					break;
				}
				Err(err) => {
					self.platform.log(LogLevel::Warn, &format!("frame read failed for {device}: {err}"));
					break;
				}
			};

			if let Err(err) = self.handle_frame(&device, &frame, &raw_tx, &app_factory).await {
				self.platform.log(LogLevel::Error, &format!("session error for {device}, disposing: {err}"));
				break;
			}
		}

		drop(raw_tx);
		let _ = writer_task.await;
		Ok(())
	}

	async fn handle_frame(self: &Arc<Self>, device: &DeviceAddress, frame: &[u8], raw_tx: &mpsc::UnboundedSender<Vec<u8>>, app_factory: &Arc<dyn AppFactory>) -> Result<()> {
		let mut r = Reader::new(frame);
		let header = CommonHeader::decode(&mut r)?;
		let body = r.read_bytes(r.remaining())?.to_vec();

		let session = {
			let mut registry = self.registry.lock().expect("session registry mutex is not poisoned");
			registry.get_or_create(device.clone(), &header, raw_tx.clone(), self.local_certificate.clone(), app_factory.clone())?
		};

		let dispatch = {
			let mut session = session.lock().expect("session mutex is not poisoned");
			session.handle_message(&header, &body)
		};

		match dispatch {
			Ok(Dispatch::None) => Ok(()),
			Ok(Dispatch::ToChannel { channel, sequence_number, payload }) => {
				let outbound = session.lock().expect("session mutex is not poisoned").outbound().expect("an Established session always has an outbound handle");

				let host = self.clone();
				let session = session.clone();
				tokio::spawn(async move {
					let outcome = channel.handle_message(&outbound, payload).await;
					let local_id = session.lock().expect("session mutex is not poisoned").local_id();
					session.lock().expect("session mutex is not poisoned").finish_reassembly(sequence_number);

					match outcome {
						Ok(near_core::ChannelOutcome::Continue) => {}
						Ok(near_core::ChannelOutcome::CloseChannel) => {
							session.lock().expect("session mutex is not poisoned").remove_channel(channel.id);
						}
						Ok(near_core::ChannelOutcome::CloseSession) => {
							session.lock().expect("session mutex is not poisoned").dispose();
							host.registry.lock().expect("session registry mutex is not poisoned").remove(local_id);
						}
						Err(err) => {
							host.platform.log(LogLevel::Error, &format!("channel application error, disposing session {local_id}: {err}"));
							session.lock().expect("session mutex is not poisoned").dispose();
							host.registry.lock().expect("session registry mutex is not poisoned").remove(local_id);
						}
					}
				});
				Ok(())
			}
			Err(err) => {
				let local_id = session.lock().expect("session mutex is not poisoned").local_id();
				session.lock().expect("session mutex is not poisoned").dispose();
				self.registry.lock().expect("session registry mutex is not poisoned").remove(local_id);
				Err(HostError::Session(err))
			}
		}
	}
}

/// Read one length-prefixed frame (spec.md §6: "16-bit big-endian length
/// prefix followed by a CommonHeader and body") directly off the transport.
/// Returns `Ok(None)` on a clean EOF before any bytes of the next frame.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
	let mut len_buf = [0u8; 2];
	match reader.read_exact(&mut len_buf).await {
		Ok(()) => {}
		Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(err) => return Err(err),
	}

	let len = u16::from_be_bytes(len_buf) as usize;
	let mut body = vec![0u8; len];
	reader.read_exact(&mut body).await?;
	Ok(Some(body))
}

async fn drive_writer<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) -> std::io::Result<()> {
	while let Some(frame) = rx.recv().await {
		writer.write_all(&frame).await?;
	}
	Ok(())
}
