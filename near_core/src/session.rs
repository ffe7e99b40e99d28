use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use wire::{AdditionalHeader, CommonHeader, Flags, MessageType, Reader, SessionId, Writer};

use crate::channel::{AppFactory, Channel, ChannelRegistry};
use crate::connect::{ConnectRequest, ConnectResponse, ConnectResult, CURVE_NIST_P256};
use crate::control::{self, kind, AuthRequest, StartChannelRequest, StartChannelResponse, StartChannelResult};
use crate::device::DeviceAddress;
use crate::error::{Result, SessionError};
use crate::outbound::SessionOutbound;
use crate::reassembly::Reassembler;

/// Drives `AwaitingConnectRequest → AwaitingAuth → AwaitingAuthDone →
/// Established → Disposed` (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	AwaitingConnectRequest,
	AwaitingAuth,
	AwaitingAuthDone,
	Established,
	Disposed,
}

/// Tracks which of the two symmetric auth exchanges (device, user) have
/// completed — they may arrive in either order, both are required before
/// `AuthDoneRequest` (spec.md §4.3).
#[derive(Default)]
struct AuthProgress {
	device_done: bool,
	user_done: bool,
}

impl AuthProgress {
	fn both_done(&self) -> bool {
		self.device_done && self.user_done
	}
}

/// What handling one frame produced, beyond any inline reply already queued
/// on the session's outbound sink.
pub enum Dispatch {
	/// Nothing further to do (an inline reply was sent, or the message was
	/// benign and ignored).
	None,
	/// A Session-type message finished reassembly and is ready for its
	/// channel's application. The caller spawns a background task to run
	/// it and must call [`Session::finish_reassembly`] once that task
	/// resolves (spec.md §4.6, §5).
	ToChannel { channel: Arc<Channel>, sequence_number: u32, payload: Vec<u8> },
}

/// One remote peer's authenticated, encrypted context (spec.md §3).
pub struct Session {
	local_id: u32,
	remote_id: u32,
	device: DeviceAddress,
	state: SessionState,

	local_key: crypto::LocalKeyMaterial,
	remote_nonce: Option<[u8; 8]>,
	cryptor: Option<crypto::Cryptor>,
	outbound: Option<Arc<SessionOutbound>>,
	auth: AuthProgress,

	reassembler: Mutex<Reassembler>,
	channels: Mutex<ChannelRegistry>,

	raw_sink: mpsc::UnboundedSender<Vec<u8>>,
	local_certificate: Vec<u8>,
	app_factory: Arc<dyn AppFactory>,
}

impl Session {
	pub(crate) fn new(local_id: u32, remote_id: u32, device: DeviceAddress, local_key: crypto::LocalKeyMaterial, raw_sink: mpsc::UnboundedSender<Vec<u8>>, local_certificate: Vec<u8>, app_factory: Arc<dyn AppFactory>) -> Self {
		Self {
			local_id,
			remote_id,
			device,
			state: SessionState::AwaitingConnectRequest,
			local_key,
			remote_nonce: None,
			cryptor: None,
			outbound: None,
			auth: AuthProgress::default(),
			reassembler: Mutex::new(Reassembler::new()),
			channels: Mutex::new(ChannelRegistry::new()),
			raw_sink,
			local_certificate,
			app_factory,
		}
	}

	pub fn local_id(&self) -> u32 {
		self.local_id
	}

	pub fn remote_id(&self) -> u32 {
		self.remote_id
	}

	pub fn device(&self) -> &DeviceAddress {
		&self.device
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn is_disposed(&self) -> bool {
		self.state == SessionState::Disposed
	}

	/// A handle for sending replies on this session's channels. `None`
	/// until key agreement has completed.
	pub fn outbound(&self) -> Option<Arc<SessionOutbound>> {
		self.outbound.clone()
	}

	pub fn finish_reassembly(&self, sequence_number: u32) {
		self.reassembler.lock().expect("reassembler mutex is not poisoned").finish(sequence_number);
	}

	pub fn remove_channel(&self, channel_id: u64) {
		self.channels.lock().expect("channel registry mutex is not poisoned").remove(channel_id);
	}

	/// Transition to `Disposed` and hand back every open channel so the
	/// caller can drop them, releasing any pending acceptance promises
	/// (spec.md §5: "cancels all outstanding acceptance promises").
	pub fn dispose(&mut self) -> Vec<Arc<Channel>> {
		self.state = SessionState::Disposed;
		self.channels.lock().expect("channel registry mutex is not poisoned").drain()
	}

	/// Handle one already-frame-decoded message. `body` is the bytes that
	/// followed the header on the wire: ciphertext+HMAC once a cryptor
	/// exists, plaintext before then (only ever true for the very first
	/// `ConnectRequest`, per spec.md §4.2).
	pub fn handle_message(&mut self, header: &CommonHeader, body: &[u8]) -> Result<Dispatch> {
		let plaintext = match &self.cryptor {
			Some(cryptor) => cryptor.decrypt(header, body)?,
			None => body.to_vec(),
		};

		match header.message_type {
			MessageType::Connect => self.handle_connect(header, &plaintext).map(|()| Dispatch::None),
			MessageType::Control => self.handle_control(header, &plaintext).map(|()| Dispatch::None),
			MessageType::Session => self.handle_session_message(header, plaintext),
			MessageType::ReliabilityResponse => {
				tracing::debug!(session = self.local_id, "ignoring benign ReliabilityResponse");
				Ok(Dispatch::None)
			}
			MessageType::Ack => {
				tracing::debug!(session = self.local_id, "ignoring inbound Ack");
				Ok(Dispatch::None)
			}
		}
	}

	fn handle_connect(&mut self, _header: &CommonHeader, body: &[u8]) -> Result<()> {
		if self.state != SessionState::AwaitingConnectRequest {
			return Err(SessionError::UnexpectedMessage(MessageType::Connect));
		}

		let mut r = Reader::new(body);
		let req = ConnectRequest::decode(&mut r)?;

		if req.curve != CURVE_NIST_P256 {
			return Err(SessionError::ProtocolViolation("unsupported key-agreement curve"));
		}

		let keys = self.local_key.agree(&req.public_x, &req.public_y)?;
		self.remote_nonce = Some(req.nonce);

		let (local_x, local_y) = self.local_key.public_xy();
		let response = ConnectResponse {
			public_x: local_x,
			public_y: local_y,
			nonce: self.local_key.nonce,
			hmac_size: req.hmac_size,
			fragment_size: req.fragment_size,
			result: ConnectResult::Pending,
		};
		self.send_unencrypted(MessageType::Connect, |w| response.encode(w))?;

		self.outbound = Some(Arc::new(SessionOutbound::new(SessionId::new_host(self.local_id, self.remote_id), req.fragment_size, crypto::Cryptor::new(keys.clone()), self.raw_sink.clone())));
		self.cryptor = Some(crypto::Cryptor::new(keys));

		self.state = SessionState::AwaitingAuth;
		Ok(())
	}

	fn handle_control(&mut self, header: &CommonHeader, body: &[u8]) -> Result<()> {
		if matches!(self.state, SessionState::AwaitingConnectRequest | SessionState::Disposed) {
			return Err(SessionError::UnexpectedMessage(MessageType::Control));
		}

		let mut r = Reader::new(body);
		let message_kind = r.read_u8()?;

		match message_kind {
			kind::DEVICE_AUTH_REQUEST | kind::USER_DEVICE_AUTH_REQUEST => self.handle_auth_request(header, message_kind, &mut r),
			kind::UPGRADE_REQUEST => self.handle_upgrade_request(header),
			kind::AUTH_DONE_REQUEST => self.handle_auth_done_request(header),
			kind::DEVICE_INFO_MESSAGE => self.handle_device_info_message(header),
			kind::START_CHANNEL_REQUEST => self.handle_start_channel_request(header, &mut r),
			other => Err(SessionError::UnknownControlKind(other)),
		}
	}

	fn handle_auth_request(&mut self, header: &CommonHeader, message_kind: u8, r: &mut Reader) -> Result<()> {
		if !matches!(self.state, SessionState::AwaitingAuth | SessionState::AwaitingAuthDone) {
			return Err(SessionError::UnexpectedMessage(MessageType::Control));
		}

		let req = AuthRequest::decode(r)?;
		let remote_nonce = self.remote_nonce.ok_or(SessionError::ProtocolViolation("auth request before connect"))?;
		let local_nonce = self.local_key.nonce;

		crypto::thumbprint::verify(&remote_nonce, &local_nonce, &req.certificate, &req.thumbprint).map_err(|_| SessionError::Auth)?;

		match message_kind {
			kind::DEVICE_AUTH_REQUEST => self.auth.device_done = true,
			kind::USER_DEVICE_AUTH_REQUEST => self.auth.user_done = true,
			_ => unreachable!(),
		}

		let response_kind = match message_kind {
			kind::DEVICE_AUTH_REQUEST => kind::DEVICE_AUTH_RESPONSE,
			kind::USER_DEVICE_AUTH_REQUEST => kind::USER_DEVICE_AUTH_RESPONSE,
			_ => unreachable!(),
		};
		let reply_thumbprint = crypto::thumbprint::compute(&local_nonce, &remote_nonce, &self.local_certificate);
		let certificate = self.local_certificate.clone();
		self.send_control_reply(header.request_id, Vec::new(), response_kind, |w| {
			w.write_payload(&certificate);
			w.write_bytes(&reply_thumbprint);
		})?;

		if self.auth.both_done() {
			self.state = SessionState::AwaitingAuthDone;
		}
		Ok(())
	}

	fn handle_upgrade_request(&mut self, header: &CommonHeader) -> Result<()> {
		if matches!(self.state, SessionState::AwaitingConnectRequest | SessionState::Disposed) {
			return Err(SessionError::UnexpectedMessage(MessageType::Control));
		}
		self.send_control_reply(header.request_id, Vec::new(), kind::UPGRADE_FAILURE, |w| {
			w.write_u32(control::UpgradeFailure::E_NOTIMPL);
		})
	}

	fn handle_auth_done_request(&mut self, header: &CommonHeader) -> Result<()> {
		if self.state != SessionState::AwaitingAuthDone {
			return Err(SessionError::UnexpectedMessage(MessageType::Control));
		}
		self.send_control_reply(header.request_id, Vec::new(), kind::AUTH_DONE_RESPONSE, |w| {
			w.write_u32(0);
		})?;
		self.state = SessionState::Established;
		Ok(())
	}

	fn handle_device_info_message(&mut self, header: &CommonHeader) -> Result<()> {
		if self.state != SessionState::Established {
			return Err(SessionError::UnexpectedMessage(MessageType::Control));
		}
		self.send_control_reply(header.request_id, Vec::new(), kind::DEVICE_INFO_RESPONSE_MESSAGE, |_w| {})
	}

	fn handle_start_channel_request(&mut self, header: &CommonHeader, r: &mut Reader) -> Result<()> {
		if self.state != SessionState::Established {
			return Err(SessionError::UnexpectedMessage(MessageType::Control));
		}

		let req = StartChannelRequest::decode(r)?;
		let app = self.app_factory.create(&req.app_id, &req.app_name).ok_or_else(|| SessionError::UnknownApplication(req.app_id.clone()))?;

		let channel_id = self.channels.lock().expect("channel registry mutex is not poisoned").start(app).id;

		let response = StartChannelResponse { result: StartChannelResult::Success, channel_id };
		let additional_headers = vec![AdditionalHeader::reply_to(header.request_id), AdditionalHeader::start_channel_compat()];
		self.send_control_reply(header.request_id, additional_headers, kind::START_CHANNEL_RESPONSE, |w| response.encode(w))
	}

	fn handle_session_message(&mut self, header: &CommonHeader, plaintext: Vec<u8>) -> Result<Dispatch> {
		if self.state != SessionState::Established {
			return Err(SessionError::UnexpectedMessage(MessageType::Session));
		}

		let complete = self.reassembler.lock().expect("reassembler mutex is not poisoned").add_fragment(header.sequence_number, header.fragment_count, &plaintext);

		let Some(payload) = complete else {
			return Ok(Dispatch::None);
		};

		let channel = self.channels.lock().expect("channel registry mutex is not poisoned").get(header.channel_id).ok_or(SessionError::UnknownChannel(header.channel_id))?;

		if header.flags.contains(Flags::SHOULD_ACK) {
			if let Some(outbound) = &self.outbound {
				outbound.send_ack(header.request_id)?;
			}
		}

		Ok(Dispatch::ToChannel { channel, sequence_number: header.sequence_number, payload })
	}

	fn send_unencrypted(&self, message_type: MessageType, body_fn: impl FnOnce(&mut Writer)) -> Result<()> {
		let mut body_w = Writer::new();
		body_fn(&mut body_w);
		let body = body_w.into_bytes();

		let mut header = CommonHeader::new(message_type, SessionId::new_host(self.local_id, self.remote_id));
		header.payload_size = body.len() as u32;

		let mut w = Writer::new();
		header.encode(&mut w);
		w.write_bytes(&body);

		let frame = wire::frame(w.as_slice())?;
		self.raw_sink.send(frame).map_err(|_| SessionError::ProtocolViolation("outbound sink is closed"))
	}

	fn send_control_reply(&self, _request_id: u32, additional_headers: Vec<AdditionalHeader>, reply_kind: u8, body_fn: impl FnOnce(&mut Writer)) -> Result<()> {
		let outbound = self.outbound.as_ref().ok_or(SessionError::ProtocolViolation("control reply sent before key agreement"))?;

		let mut w = Writer::new();
		w.write_u8(reply_kind);
		body_fn(&mut w);

		outbound.send_control(0, additional_headers, w.as_slice())
	}
}

#[cfg(test)]
mod tests {
	use rand::rngs::OsRng;
	use wire::{Reader, Writer};

	use super::*;
	use crate::channel::ChannelApplication;
	use crate::connect::CURVE_NIST_P256;
	use crate::control::kind;

	struct NoApps;
	impl AppFactory for NoApps {
		fn create(&self, _app_id: &str, _app_name: &str) -> Option<Box<dyn ChannelApplication>> {
			None
		}
	}

	fn new_test_session() -> (Session, mpsc::UnboundedReceiver<Vec<u8>>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let local_key = crypto::LocalKeyMaterial::generate(&mut OsRng);
		let session = Session::new(0x0e, 1, DeviceAddress::from("remote-device"), local_key, tx, b"local certificate bytes".to_vec(), Arc::new(NoApps));
		(session, rx)
	}

	/// Pull the next queued outbound frame and split it back into a header
	/// and its (still possibly encrypted) body.
	fn next_header_and_body(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> (CommonHeader, Vec<u8>) {
		let frame = rx.try_recv().expect("a frame was queued");
		let mut outer = Reader::new(&frame);
		let framed = wire::read_frame_bytes(&mut outer).unwrap();
		let mut inner = Reader::new(framed);
		let header = CommonHeader::decode(&mut inner).unwrap();
		let body = inner.read_bytes(inner.remaining()).unwrap().to_vec();
		(header, body)
	}

	/// Build a `Control` message the way a remote peer would, encrypted
	/// under `cryptor`, and feed it straight to `session.handle_message`.
	fn send_encrypted_control(session: &mut Session, cryptor: &crypto::Cryptor, request_id: u32, body: &[u8]) -> Result<Dispatch> {
		let mut header = CommonHeader::new(MessageType::Control, SessionId::new(0, 0));
		header.request_id = request_id;
		header.payload_size = crypto::Cryptor::sealed_len(body.len()) as u32;
		let sealed = cryptor.encrypt(&header, body);
		session.handle_message(&header, &sealed)
	}

	#[test]
	fn full_handshake_reaches_established() {
		let (mut session, mut rx) = new_test_session();
		let remote_key = crypto::LocalKeyMaterial::generate(&mut OsRng);
		let (remote_x, remote_y) = remote_key.public_xy();

		let connect_req = ConnectRequest { curve: CURVE_NIST_P256, hmac_size: 32, fragment_size: 4096, nonce: remote_key.nonce, public_x: remote_x, public_y: remote_y };
		let mut body = Writer::new();
		connect_req.encode(&mut body);
		session.handle_message(&CommonHeader::new(MessageType::Connect, SessionId::new(0, 1)), body.as_slice()).unwrap();
		assert_eq!(session.state(), SessionState::AwaitingAuth);

		let (resp_header, resp_body) = next_header_and_body(&mut rx);
		assert_eq!(resp_header.session_id.local, 0x0e);
		let mut r = Reader::new(&resp_body);
		let mut local_x = [0u8; 32];
		local_x.copy_from_slice(r.read_bytes(32).unwrap());
		let mut local_y = [0u8; 32];
		local_y.copy_from_slice(r.read_bytes(32).unwrap());
		let mut local_nonce = [0u8; 8];
		local_nonce.copy_from_slice(r.read_bytes(8).unwrap());

		let remote_cryptor = crypto::Cryptor::new(remote_key.agree(&local_x, &local_y).unwrap());

		// Device auth, then user auth (order shouldn't matter).
		for (request_kind, response_kind) in [(kind::DEVICE_AUTH_REQUEST, kind::DEVICE_AUTH_RESPONSE), (kind::USER_DEVICE_AUTH_REQUEST, kind::USER_DEVICE_AUTH_RESPONSE)] {
			let cert = b"remote certificate".to_vec();
			let thumbprint = crypto::thumbprint::compute(&remote_key.nonce, &local_nonce, &cert);
			let mut req_body = Writer::new();
			req_body.write_u8(request_kind);
			req_body.write_payload(&cert);
			req_body.write_bytes(&thumbprint);

			send_encrypted_control(&mut session, &remote_cryptor, 1, req_body.as_slice()).unwrap();

			let (_h, body) = next_header_and_body(&mut rx);
			let plaintext = remote_cryptor.decrypt(&_h, &body).unwrap();
			assert_eq!(plaintext[0], response_kind);
		}
		assert_eq!(session.state(), SessionState::AwaitingAuthDone);

		let mut auth_done = Writer::new();
		auth_done.write_u8(kind::AUTH_DONE_REQUEST);
		send_encrypted_control(&mut session, &remote_cryptor, 2, auth_done.as_slice()).unwrap();
		let (_h, body) = next_header_and_body(&mut rx);
		let plaintext = remote_cryptor.decrypt(&_h, &body).unwrap();
		assert_eq!(plaintext[0], kind::AUTH_DONE_RESPONSE);
		assert_eq!(session.state(), SessionState::Established);
	}

	#[test]
	fn upgrade_request_is_always_refused() {
		let (mut session, mut rx) = new_test_session();
		let remote_key = crypto::LocalKeyMaterial::generate(&mut OsRng);
		let (remote_x, remote_y) = remote_key.public_xy();
		let connect_req = ConnectRequest { curve: CURVE_NIST_P256, hmac_size: 32, fragment_size: 4096, nonce: remote_key.nonce, public_x: remote_x, public_y: remote_y };
		let mut body = Writer::new();
		connect_req.encode(&mut body);
		session.handle_message(&CommonHeader::new(MessageType::Connect, SessionId::new(0, 1)), body.as_slice()).unwrap();
		let (_h, resp) = next_header_and_body(&mut rx);
		let mut r = Reader::new(&resp);
		let mut local_x = [0u8; 32];
		local_x.copy_from_slice(r.read_bytes(32).unwrap());
		let mut local_y = [0u8; 32];
		local_y.copy_from_slice(r.read_bytes(32).unwrap());
		let remote_cryptor = crypto::Cryptor::new(remote_key.agree(&local_x, &local_y).unwrap());

		let mut upgrade = Writer::new();
		upgrade.write_u8(kind::UPGRADE_REQUEST);
		send_encrypted_control(&mut session, &remote_cryptor, 9, upgrade.as_slice()).unwrap();

		let (_h, body) = next_header_and_body(&mut rx);
		let plaintext = remote_cryptor.decrypt(&_h, &body).unwrap();
		assert_eq!(plaintext[0], kind::UPGRADE_FAILURE);
		let mut r = Reader::new(&plaintext[1..]);
		assert_ne!(r.read_u32().unwrap(), 0);
		assert_eq!(session.state(), SessionState::AwaitingAuth);
	}

	#[test]
	fn wrong_thumbprint_nonce_order_fails_auth() {
		let (mut session, mut rx) = new_test_session();
		let remote_key = crypto::LocalKeyMaterial::generate(&mut OsRng);
		let (remote_x, remote_y) = remote_key.public_xy();
		let connect_req = ConnectRequest { curve: CURVE_NIST_P256, hmac_size: 32, fragment_size: 4096, nonce: remote_key.nonce, public_x: remote_x, public_y: remote_y };
		let mut body = Writer::new();
		connect_req.encode(&mut body);
		session.handle_message(&CommonHeader::new(MessageType::Connect, SessionId::new(0, 1)), body.as_slice()).unwrap();
		let (_h, resp) = next_header_and_body(&mut rx);
		let mut r = Reader::new(&resp);
		let mut local_x = [0u8; 32];
		local_x.copy_from_slice(r.read_bytes(32).unwrap());
		let mut local_y = [0u8; 32];
		local_y.copy_from_slice(r.read_bytes(32).unwrap());
		let mut local_nonce = [0u8; 8];
		local_nonce.copy_from_slice(r.read_bytes(8).unwrap());
		let remote_cryptor = crypto::Cryptor::new(remote_key.agree(&local_x, &local_y).unwrap());

		let cert = b"remote certificate".to_vec();
		// Wrong order: should be (remote_nonce, local_nonce).
		let bad_thumbprint = crypto::thumbprint::compute(&local_nonce, &remote_key.nonce, &cert);
		let mut req_body = Writer::new();
		req_body.write_u8(kind::DEVICE_AUTH_REQUEST);
		req_body.write_payload(&cert);
		req_body.write_bytes(&bad_thumbprint);

		let err = send_encrypted_control(&mut session, &remote_cryptor, 1, req_body.as_slice()).unwrap_err();
		assert!(matches!(err, SessionError::Auth));
	}

	#[test]
	fn start_channel_with_unknown_app_is_fatal() {
		let (mut session, mut rx) = new_test_session();
		let remote_key = crypto::LocalKeyMaterial::generate(&mut OsRng);
		let (remote_x, remote_y) = remote_key.public_xy();
		let connect_req = ConnectRequest { curve: CURVE_NIST_P256, hmac_size: 32, fragment_size: 4096, nonce: remote_key.nonce, public_x: remote_x, public_y: remote_y };
		let mut body = Writer::new();
		connect_req.encode(&mut body);
		session.handle_message(&CommonHeader::new(MessageType::Connect, SessionId::new(0, 1)), body.as_slice()).unwrap();
		let (_h, resp) = next_header_and_body(&mut rx);
		let mut r = Reader::new(&resp);
		let mut local_x = [0u8; 32];
		local_x.copy_from_slice(r.read_bytes(32).unwrap());
		let mut local_y = [0u8; 32];
		local_y.copy_from_slice(r.read_bytes(32).unwrap());
		let remote_cryptor = crypto::Cryptor::new(remote_key.agree(&local_x, &local_y).unwrap());

		// Force the session directly into Established to isolate channel
		// start behavior from the rest of the handshake.
		session.state = SessionState::Established;

		let mut start = Writer::new();
		start.write_u8(kind::START_CHANNEL_REQUEST);
		start.write_string_utf8("com.unknown.app");
		start.write_string_utf8("Unknown App");

		let err = send_encrypted_control(&mut session, &remote_cryptor, 3, start.as_slice()).unwrap_err();
		assert!(matches!(err, SessionError::UnknownApplication(_)));
	}
}
