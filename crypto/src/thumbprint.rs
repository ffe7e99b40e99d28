use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Compute the thumbprint used to prove both sides share the same pair of
/// handshake nonces (spec.md §4.3): `HMAC-SHA256(key, cert_bytes)` where
/// `key` is derived from the two nonces, concatenated in the order given by
/// the caller.
///
/// `DeviceAuthRequest` hashes `(local_nonce, remote_nonce)`; the response
/// hashes them in the opposite order ("a thumbprint over the reversed nonce
/// ordering", spec.md §4.3) — callers swap the arguments rather than this
/// function having two code paths.
pub fn compute(nonce_first: &[u8], nonce_second: &[u8], cert_bytes: &[u8]) -> [u8; 32] {
	let key: [u8; 32] = Sha256::digest([nonce_first, nonce_second].concat()).into();

	let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC accepts any key length");
	mac.update(cert_bytes);
	mac.finalize().into_bytes().into()
}

/// Verify a received thumbprint in constant time.
pub fn verify(nonce_first: &[u8], nonce_second: &[u8], cert_bytes: &[u8], received: &[u8]) -> Result<()> {
	let expected = compute(nonce_first, nonce_second, cert_bytes);
	if expected.ct_eq(received).unwrap_u8() == 1 {
		Ok(())
	} else {
		Err(Error::ThumbprintMismatch)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matching_nonces_and_order_verify() {
		let a = [1u8; 8];
		let b = [2u8; 8];
		let cert = b"certificate bytes";

		let tp = compute(&a, &b, cert);
		assert!(verify(&a, &b, cert, &tp).is_ok());
	}

	#[test]
	fn reversed_order_does_not_match() {
		let a = [1u8; 8];
		let b = [2u8; 8];
		let cert = b"certificate bytes";

		let tp = compute(&a, &b, cert);
		assert_eq!(verify(&b, &a, cert, &tp), Err(Error::ThumbprintMismatch));
	}

	#[test]
	fn wrong_cert_fails() {
		let a = [1u8; 8];
		let b = [2u8; 8];

		let tp = compute(&a, &b, b"real cert");
		assert_eq!(verify(&a, &b, b"wrong cert", &tp), Err(Error::ThumbprintMismatch));
	}
}
