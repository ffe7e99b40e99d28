//! The Near Share file/URI receiver: the channel-level state machine that
//! spec.md §4.7 describes, layered on the generic session/channel machinery
//! `near_core` provides.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use valueset::{Value, ValueSet};
use wire::{Reader, Writer};

use near_core::{AppFactory, ChannelApplication, ChannelOutcome, DeviceAddress, Result, SessionError, SessionOutbound};

use crate::config::Config;
use crate::platform::PlatformHandler;
use crate::protocol::{control_message, data_kind, key, PREFIX_LEN};
use crate::transfer::{FileTransferToken, TransferDecision, TransferSink};

/// The well-known application id this crate registers under (spec.md §6:
/// "The Near Share application registers itself under its well-known id").
pub const APP_ID: &str = "NearSharePlatform";

/// What the application is doing with the one channel it was handed (spec.md
/// §9's Open Question: Near Share is single-shot, so there is only ever one
/// transfer per channel, never a queue of them).
enum State {
	/// No `StartRequest` has arrived yet.
	AwaitingStart,
	/// A file transfer was accepted and is receiving `FetchDataResponse`
	/// fragments.
	ReceivingFile { sink: Box<dyn TransferSink>, token: Arc<FileTransferToken>, bytes_to_send: u64, transferred: u64 },
	/// The channel has done its one job (spec.md §9: single-shot).
	Done,
}

/// spec.md §4.7's channel-level state machine: receives `ValueSet` messages,
/// emits `OnReceivedUri`/`OnFileTransfer` to the platform, and drives the
/// `FetchDataRequest`/`FetchDataResponse` exchange for file transfers.
pub struct NearShareApp {
	platform: Arc<dyn PlatformHandler>,
	device: DeviceAddress,
	config: Config,
	state: State,
}

impl NearShareApp {
	pub fn new(platform: Arc<dyn PlatformHandler>, device: DeviceAddress, config: Config) -> Self {
		Self { platform, device, config, state: State::AwaitingStart }
	}

	fn encode_reply(prefix: &[u8], body: &ValueSet) -> Vec<u8> {
		let mut w = Writer::new();
		w.write_bytes(prefix);
		body.encode(&mut w);
		w.into_bytes()
	}

	async fn handle_start_request(&mut self, outbound: &Arc<SessionOutbound>, channel_id: u64, prefix: &[u8], vs: &ValueSet) -> Result<ChannelOutcome> {
		let data_kind = vs.get_u32(key::DATA_KIND)?;

		match data_kind {
			data_kind::URI => {
				let uri = vs.get_string(key::URI)?;
				info!(device = %self.device, uri, "received URI");
				self.platform.on_received_uri(self.device.as_str(), uri).await;

				let mut response = ValueSet::new();
				response.insert(key::CONTROL_MESSAGE, Value::U32(control_message::START_RESPONSE));
				outbound.send_session_message(channel_id, &Self::encode_reply(prefix, &response))?;

				self.state = State::Done;
				Ok(ChannelOutcome::CloseSession)
			}
			data_kind::FILE => {
				let names = vs.get_list_string(key::FILE_NAMES)?;
				if names.len() != 1 {
					return Err(SessionError::NotImplemented("multi-file transfers are not supported"));
				}
				let filename = names[0].clone();
				let bytes_to_send = vs.get_u64(key::BYTES_TO_SEND)?;

				let (token, decision_rx) = FileTransferToken::new(filename, bytes_to_send);
				self.platform.on_file_transfer(token.clone()).await;

				let decision = decision_rx.await.unwrap_or(TransferDecision::Cancelled);
				let sink = match decision {
					TransferDecision::Accepted(sink) => sink,
					TransferDecision::Cancelled => {
						warn!(device = %self.device, "file transfer cancelled before any data was requested");
						return Err(SessionError::ProtocolViolation("file transfer cancelled by platform handler"));
					}
				};

				self.issue_fetch_requests(outbound, channel_id, prefix, bytes_to_send)?;
				self.state = State::ReceivingFile { sink, token, bytes_to_send, transferred: 0 };
				Ok(ChannelOutcome::Continue)
			}
			other => {
				warn!(data_kind = other, "unsupported DataKind in StartRequest");
				Err(SessionError::NotImplemented("unsupported DataKind"))
			}
		}
	}

	/// Issue the contiguous series of `FetchDataRequest` messages covering
	/// `[0, bytes_to_send)` in `config.partition_size`-sized chunks (spec.md
	/// §4.7). Every chunk, including the last, declares a full partition-sized
	/// `BlobSize` — the peer may send back fewer bytes than requested for the
	/// final chunk, and [`NearShareApp::handle_fetch_data_response`]'s
	/// truncation against `bytes_to_send` handles that (spec.md §9's Open
	/// Question: "the implementation may request a full-sized chunk and
	/// truncate on receive").
	fn issue_fetch_requests(&self, outbound: &Arc<SessionOutbound>, channel_id: u64, prefix: &[u8], bytes_to_send: u64) -> Result<()> {
		let partition = self.config.partition_size;
		let chunk_count = bytes_to_send.div_ceil(partition);

		for i in 0..chunk_count {
			let position = i * partition;

			let mut request = ValueSet::new();
			request.insert(key::CONTROL_MESSAGE, Value::U32(control_message::FETCH_DATA_REQUEST));
			request.insert(key::BLOB_POSITION, Value::U64(position));
			request.insert(key::BLOB_SIZE, Value::U64(partition));
			request.insert(key::CONTENT_ID, Value::U32(0));

			outbound.send_session_message(channel_id, &Self::encode_reply(prefix, &request))?;
		}

		Ok(())
	}

	fn handle_fetch_data_response(&mut self, outbound: &Arc<SessionOutbound>, channel_id: u64, prefix: &[u8], vs: &ValueSet) -> Result<ChannelOutcome> {
		let State::ReceivingFile { sink, token, bytes_to_send, transferred } = &mut self.state else {
			return Err(SessionError::ProtocolViolation("FetchDataResponse received outside an active file transfer"));
		};

		let position = vs.get_u64(key::BLOB_POSITION)?;
		let blob = vs.get_bytes(key::DATA_BLOB)?;

		if position > *bytes_to_send || blob.len() as u64 > self.config.partition_size {
			return Err(SessionError::ProtocolViolation("FetchDataResponse position/size out of range"));
		}

		// Truncate so a blob that would overrun the declared size never
		// writes past it (spec.md §9's Open Question: retain the truncation
		// behavior for compatibility).
		let write_len = ((*bytes_to_send - position).min(blob.len() as u64)) as usize;
		sink.write_at(position, &blob[..write_len]).map_err(|_| SessionError::ProtocolViolation("file sink write failed"))?;

		*transferred += write_len as u64;
		token.add_received(write_len as u64);

		debug!(transferred = *transferred, bytes_to_send = *bytes_to_send, "received file fragment");
		let done = *transferred == *bytes_to_send;

		if done {
			let mut response = ValueSet::new();
			response.insert(key::CONTROL_MESSAGE, Value::U32(control_message::START_RESPONSE));
			outbound.send_session_message(channel_id, &Self::encode_reply(prefix, &response))?;

			self.state = State::Done;
			Ok(ChannelOutcome::CloseSession)
		} else {
			Ok(ChannelOutcome::Continue)
		}
	}
}

#[async_trait]
impl ChannelApplication for NearShareApp {
	async fn handle_message(&mut self, outbound: &Arc<SessionOutbound>, channel_id: u64, payload: Vec<u8>) -> Result<ChannelOutcome> {
		if payload.len() < PREFIX_LEN {
			return Err(SessionError::ProtocolViolation("Near Share payload shorter than the correlation-vector prefix"));
		}
		let (prefix, rest) = payload.split_at(PREFIX_LEN);

		let mut r = Reader::new(rest);
		let vs = ValueSet::decode(&mut r)?;

		let control_message = vs.get_u32(key::CONTROL_MESSAGE)?;
		match control_message {
			control_message::START_REQUEST => self.handle_start_request(outbound, channel_id, prefix, &vs).await,
			control_message::FETCH_DATA_RESPONSE => self.handle_fetch_data_response(outbound, channel_id, prefix, &vs),
			other => {
				warn!(control_message = other, "unexpected ControlMessage for the current transfer state");
				Err(SessionError::ProtocolViolation("unexpected ControlMessage for the current transfer state"))
			}
		}
	}
}

/// Builds one [`NearShareApp`] per channel, bound to the session's remote
/// device and the process-wide platform handler (spec.md §6: "Application
/// factory"). A fresh factory is constructed per connection by the host so
/// each application instance knows which device it is talking to without
/// `near_core` itself needing to know about devices or platforms.
pub struct NearShareAppFactory {
	platform: Arc<dyn PlatformHandler>,
	device: DeviceAddress,
	config: Config,
}

impl NearShareAppFactory {
	pub fn new(platform: Arc<dyn PlatformHandler>, device: DeviceAddress, config: Config) -> Self {
		Self { platform, device, config }
	}
}

impl AppFactory for NearShareAppFactory {
	fn create(&self, app_id: &str, _app_name: &str) -> Option<Box<dyn ChannelApplication>> {
		if app_id != APP_ID {
			return None;
		}
		Some(Box::new(NearShareApp::new(self.platform.clone(), self.device.clone(), self.config.clone())))
	}
}
