//! The fixed-layout bodies carried by `Control`-type messages that belong to
//! the session/channel handshake itself (device auth, upgrade negotiation,
//! channel start) — as opposed to the `ValueSet`-encoded bodies an
//! application uses once a channel is open (spec.md §3, §4.5).

use wire::{Reader, Writer};

/// The first byte of every `Control` message body, identifying which of the
/// fixed handshake messages follows.
pub mod kind {
	pub const DEVICE_AUTH_REQUEST: u8 = 1;
	pub const DEVICE_AUTH_RESPONSE: u8 = 2;
	pub const USER_DEVICE_AUTH_REQUEST: u8 = 3;
	pub const USER_DEVICE_AUTH_RESPONSE: u8 = 4;
	pub const UPGRADE_REQUEST: u8 = 5;
	pub const UPGRADE_FAILURE: u8 = 6;
	pub const AUTH_DONE_REQUEST: u8 = 7;
	pub const AUTH_DONE_RESPONSE: u8 = 8;
	pub const DEVICE_INFO_MESSAGE: u8 = 9;
	pub const DEVICE_INFO_RESPONSE_MESSAGE: u8 = 10;
	pub const START_CHANNEL_REQUEST: u8 = 11;
	pub const START_CHANNEL_RESPONSE: u8 = 12;
}

/// Body shared by `DeviceAuthRequest` and `UserDeviceAuthRequest` (spec.md
/// §4.3: "thumbprint of the peer's certificate, computed over a
/// nonce-derived key").
pub struct AuthRequest {
	pub certificate: Vec<u8>,
	pub thumbprint: [u8; 32],
}

impl AuthRequest {
	pub fn decode(r: &mut Reader) -> wire::Result<Self> {
		let certificate = r.read_payload()?.to_vec();
		let mut thumbprint = [0u8; 32];
		thumbprint.copy_from_slice(r.read_bytes(32)?);
		Ok(Self { certificate, thumbprint })
	}

	pub fn encode(&self, w: &mut Writer) {
		w.write_payload(&self.certificate);
		w.write_bytes(&self.thumbprint);
	}
}

/// Body shared by `DeviceAuthResponse` and `UserDeviceAuthResponse`: the
/// same shape as the request, sent back with our own certificate and a
/// thumbprint computed with the nonce order reversed (spec.md §4.3).
pub type AuthResponse = AuthRequest;

/// `UpgradeFailure`'s body: the HRESULT explaining why the upgrade was
/// refused. This receiver never accepts an upgrade (spec.md §4.3's
/// Non-goals exclude alternate transports), so every `UpgradeRequest` is
/// answered with one of these.
pub struct UpgradeFailure {
	pub hresult: u32,
}

impl UpgradeFailure {
	/// Generic "not supported" HRESULT, used since no transport upgrade is
	/// ever offered.
	pub const E_NOTIMPL: u32 = 0x8000_4001;

	pub fn decode(r: &mut Reader) -> wire::Result<Self> {
		Ok(Self { hresult: r.read_u32()? })
	}

	pub fn encode(&self, w: &mut Writer) {
		w.write_u32(self.hresult);
	}
}

/// `AuthDoneResponse`'s body: an HRESULT, zero on success.
pub struct AuthDoneResponse {
	pub hresult: u32,
}

impl AuthDoneResponse {
	pub fn decode(r: &mut Reader) -> wire::Result<Self> {
		Ok(Self { hresult: r.read_u32()? })
	}

	pub fn encode(&self, w: &mut Writer) {
		w.write_u32(self.hresult);
	}
}

/// `StartChannelRequest`'s body: the application id/name pair an
/// application factory resolves (spec.md §6).
pub struct StartChannelRequest {
	pub app_id: String,
	pub app_name: String,
}

impl StartChannelRequest {
	pub fn decode(r: &mut Reader) -> wire::Result<Self> {
		let app_id = r.read_string_utf8()?;
		let app_name = r.read_string_utf8()?;
		Ok(Self { app_id, app_name })
	}

	pub fn encode(&self, w: &mut Writer) {
		w.write_string_utf8(&self.app_id);
		w.write_string_utf8(&self.app_name);
	}
}

/// `StartChannelResponse`'s result code. An unknown `app_id` never reaches
/// this response: it is a fatal protocol violation that disposes the session
/// before any `StartChannelResponse` is sent (spec.md §7), so the only result
/// this side ever emits is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartChannelResult {
	Success,
}

impl StartChannelResult {
	fn to_u8(self) -> u8 {
		match self {
			StartChannelResult::Success => 0,
		}
	}
}

pub struct StartChannelResponse {
	pub result: StartChannelResult,
	pub channel_id: u64,
}

impl StartChannelResponse {
	pub fn encode(&self, w: &mut Writer) {
		w.write_u8(self.result.to_u8());
		w.write_u64(self.channel_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auth_request_round_trips() {
		let req = AuthRequest { certificate: vec![1, 2, 3, 4], thumbprint: [9u8; 32] };
		let mut w = Writer::new();
		req.encode(&mut w);
		let bytes = w.into_bytes();
		let mut r = Reader::new(&bytes);
		let decoded = AuthRequest::decode(&mut r).unwrap();
		assert_eq!(decoded.certificate, req.certificate);
		assert_eq!(decoded.thumbprint, req.thumbprint);
	}

	#[test]
	fn start_channel_request_round_trips() {
		let req = StartChannelRequest { app_id: "com.example.nearshare".into(), app_name: "Near Share".into() };
		let mut w = Writer::new();
		req.encode(&mut w);
		let bytes = w.into_bytes();
		let mut r = Reader::new(&bytes);
		let decoded = StartChannelRequest::decode(&mut r).unwrap();
		assert_eq!(decoded.app_id, req.app_id);
		assert_eq!(decoded.app_name, req.app_name);
	}
}
