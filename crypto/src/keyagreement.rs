use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, PublicKey, SecretKey};
use rand::RngCore;

use crate::error::{Error, Result};

/// Byte length of the nonce exchanged in `ConnectRequest`/`ConnectResponse`.
pub const NONCE_LEN: usize = 8;

/// The local side's half of the NIST P-256 ECDH key agreement (spec.md §4.2,
/// §6: "Curve: NIST P-256"), plus the nonce sent alongside the public point.
///
/// Held by a [`near_core::Session`] for its lifetime; regenerated for every
/// new session (there is no static device keypair at this layer — the
/// out-of-scope certificate store is what gives a device its durable
/// identity, per spec.md §1).
pub struct LocalKeyMaterial {
	secret: SecretKey,
	pub nonce: [u8; NONCE_LEN],
}

impl LocalKeyMaterial {
	pub fn generate(rng: &mut impl RngCore) -> Self {
		let secret = SecretKey::random(rng);
		let mut nonce = [0u8; NONCE_LEN];
		rng.fill_bytes(&mut nonce);
		Self { secret, nonce }
	}

	/// The uncompressed SEC1 affine coordinates of the local public point.
	pub fn public_xy(&self) -> ([u8; 32], [u8; 32]) {
		let point = self.secret.public_key().to_encoded_point(false);
		let mut x = [0u8; 32];
		let mut y = [0u8; 32];
		x.copy_from_slice(point.x().expect("uncompressed point has an x coordinate"));
		y.copy_from_slice(point.y().expect("uncompressed point has a y coordinate"));
		(x, y)
	}

	/// Perform ECDH against the peer's public point and derive the session
	/// keying material from the resulting shared secret.
	pub fn agree(&self, remote_x: &[u8], remote_y: &[u8]) -> Result<SessionKeys> {
		let remote_point = remote_public_point(remote_x, remote_y)?;
		let shared = diffie_hellman(self.secret.to_nonzero_scalar(), remote_point.as_affine());

		let mut secret = [0u8; 32];
		secret.copy_from_slice(shared.raw_secret_bytes().as_slice());

		Ok(SessionKeys::derive(&secret))
	}
}

fn remote_public_point(x: &[u8], y: &[u8]) -> Result<PublicKey> {
	if x.len() != 32 || y.len() != 32 {
		return Err(Error::InvalidPublicPoint);
	}

	let mut sec1 = Vec::with_capacity(65);
	sec1.push(0x04);
	sec1.extend_from_slice(x);
	sec1.extend_from_slice(y);

	let encoded = EncodedPoint::from_bytes(&sec1).map_err(|_| Error::InvalidPublicPoint)?;
	Option::from(PublicKey::from_encoded_point(&encoded)).ok_or(Error::InvalidPublicPoint)
}

/// The symmetric key material derived from one session's ECDH shared secret
/// (spec.md §4.2: "a key and IV split from the secret"). The AES-128 key and
/// IV are the secret's two halves, taken unhashed; the HMAC-SHA256 key is the
/// full 32-byte secret reused whole (see `DESIGN.md`'s Open Question
/// resolutions — the secret is fully consumed by `aes_key`/`aes_iv` and the
/// spec names no third derived value).
#[derive(Clone)]
pub struct SessionKeys {
	pub aes_key: [u8; 16],
	pub aes_iv: [u8; 16],
	pub hmac_key: [u8; 32],
}

impl SessionKeys {
	fn derive(shared_secret: &[u8; 32]) -> Self {
		let mut aes_key = [0u8; 16];
		let mut aes_iv = [0u8; 16];
		aes_key.copy_from_slice(&shared_secret[0..16]);
		aes_iv.copy_from_slice(&shared_secret[16..32]);

		Self { aes_key, aes_iv, hmac_key: *shared_secret }
	}
}

#[cfg(test)]
mod tests {
	use rand::rngs::OsRng;

	use super::*;

	#[test]
	fn ecdh_agrees_on_both_sides() {
		let mut rng = OsRng;
		let a = LocalKeyMaterial::generate(&mut rng);
		let b = LocalKeyMaterial::generate(&mut rng);

		let (ax, ay) = a.public_xy();
		let (bx, by) = b.public_xy();

		let ka = a.agree(&bx, &by).unwrap();
		let kb = b.agree(&ax, &ay).unwrap();

		assert_eq!(ka.aes_key, kb.aes_key);
		assert_eq!(ka.aes_iv, kb.aes_iv);
		assert_eq!(ka.hmac_key, kb.hmac_key);
	}
}
