//! The `Connect`-type message bodies exchanged before a `Cryptor` exists,
//! and so the only bodies ever sent or received in the clear (spec.md §4.2,
//! §4.3: key agreement).

use wire::{Reader, Writer};

/// Curve identifier carried in `ConnectRequest`. This receiver only
/// understands NIST P-256 (spec.md §4.3's Non-goals exclude other curves).
pub const CURVE_NIST_P256: u8 = 1;

pub struct ConnectRequest {
	pub curve: u8,
	pub hmac_size: u16,
	pub fragment_size: u16,
	pub nonce: [u8; 8],
	pub public_x: [u8; 32],
	pub public_y: [u8; 32],
}

impl ConnectRequest {
	pub fn decode(r: &mut Reader) -> wire::Result<Self> {
		let curve = r.read_u8()?;
		let hmac_size = r.read_u16()?;
		let fragment_size = r.read_u16()?;
		let mut nonce = [0u8; 8];
		nonce.copy_from_slice(r.read_bytes(8)?);
		let mut public_x = [0u8; 32];
		public_x.copy_from_slice(r.read_bytes(32)?);
		let mut public_y = [0u8; 32];
		public_y.copy_from_slice(r.read_bytes(32)?);
		Ok(Self { curve, hmac_size, fragment_size, nonce, public_x, public_y })
	}

	pub fn encode(&self, w: &mut Writer) {
		w.write_u8(self.curve);
		w.write_u16(self.hmac_size);
		w.write_u16(self.fragment_size);
		w.write_bytes(&self.nonce);
		w.write_bytes(&self.public_x);
		w.write_bytes(&self.public_y);
	}
}

/// `ConnectResponse`'s result code (spec.md §4.3). An unsupported curve never
/// reaches this response: it is a fatal protocol violation that disposes the
/// session before any `ConnectResponse` is sent (spec.md §7), so the only
/// result this side ever emits is `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
	Pending,
}

impl ConnectResult {
	fn to_u8(self) -> u8 {
		match self {
			ConnectResult::Pending => 0,
		}
	}
}

pub struct ConnectResponse {
	pub public_x: [u8; 32],
	pub public_y: [u8; 32],
	pub nonce: [u8; 8],
	pub hmac_size: u16,
	pub fragment_size: u16,
	pub result: ConnectResult,
}

impl ConnectResponse {
	pub fn encode(&self, w: &mut Writer) {
		w.write_bytes(&self.public_x);
		w.write_bytes(&self.public_y);
		w.write_bytes(&self.nonce);
		w.write_u16(self.hmac_size);
		w.write_u16(self.fragment_size);
		w.write_u8(self.result.to_u8());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn connect_request_round_trips() {
		let req = ConnectRequest { curve: CURVE_NIST_P256, hmac_size: 32, fragment_size: 4096, nonce: [7u8; 8], public_x: [1u8; 32], public_y: [2u8; 32] };
		let mut w = Writer::new();
		req.encode(&mut w);
		let bytes = w.into_bytes();
		let mut r = Reader::new(&bytes);
		let decoded = ConnectRequest::decode(&mut r).unwrap();
		assert_eq!(decoded.curve, req.curve);
		assert_eq!(decoded.nonce, req.nonce);
		assert_eq!(decoded.public_x, req.public_x);
		assert_eq!(decoded.public_y, req.public_y);
	}
}
