use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use wire::{CommonHeader, Writer};

use crate::error::{Error, Result};
use crate::keyagreement::SessionKeys;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of the HMAC-SHA256 tag appended after the ciphertext.
pub const HMAC_LEN: usize = 32;

/// The session-scoped symmetric envelope (spec.md §4.2): AES-128-CBC over
/// the body, with an HMAC-SHA256 computed over the serialized header (with
/// its `PayloadSize` set to the final on-wire body length) followed by the
/// ciphertext.
///
/// A `Cryptor` only exists once key agreement has completed — see
/// `near_core::Session`, which holds it as `Option<Cryptor>` and treats its
/// absence as "read/write this message in the clear", matching spec.md §4.2's
/// "when unencrypted, return the input reader unchanged".
pub struct Cryptor {
	keys: SessionKeys,
}

impl Cryptor {
	pub fn new(keys: SessionKeys) -> Self {
		Self { keys }
	}

	/// Decrypt and authenticate an inbound body. `header` must already carry
	/// the `PayloadSize` as it appeared on the wire (the length of `body`).
	pub fn decrypt(&self, header: &CommonHeader, body: &[u8]) -> Result<Vec<u8>> {
		if body.len() < HMAC_LEN {
			return Err(Error::BodyTooShort);
		}

		let (ciphertext, tag) = body.split_at(body.len() - HMAC_LEN);

		let expected = self.mac_over(header, ciphertext);
		if expected.ct_eq(tag).unwrap_u8() != 1 {
			tracing::warn!(session_id = header.session_id.to_u64(), "HMAC verification failed on inbound frame");
			return Err(Error::IntegrityFailure);
		}

		Aes128CbcDec::new(&self.keys.aes_key.into(), &self.keys.aes_iv.into())
			.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
			.map_err(|_| Error::InvalidPadding)
	}

	/// Encrypt `plaintext` and return the on-wire body (`ciphertext || hmac`).
	/// `header` is used only to compute the HMAC's additional data and is
	/// expected to already have `PayloadSize` set to the length of the
	/// returned body (callers typically compute the body first, via
	/// [`Cryptor::sealed_len`], to size the header before calling this).
	pub fn encrypt(&self, header: &CommonHeader, plaintext: &[u8]) -> Vec<u8> {
		let ciphertext = Aes128CbcEnc::new(&self.keys.aes_key.into(), &self.keys.aes_iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

		let tag = self.mac_over(header, &ciphertext);

		let mut body = ciphertext;
		body.extend_from_slice(&tag);
		body
	}

	/// The on-wire body length that encrypting `plaintext_len` bytes will
	/// produce, so callers can set `CommonHeader::payload_size` before
	/// calling [`Cryptor::encrypt`].
	pub fn sealed_len(plaintext_len: usize) -> usize {
		let block = 16;
		let padded = (plaintext_len / block + 1) * block;
		padded + HMAC_LEN
	}

	fn mac_over(&self, header: &CommonHeader, ciphertext: &[u8]) -> [u8; HMAC_LEN] {
		let mut w = Writer::new();
		header.encode(&mut w);

		let mut mac = HmacSha256::new_from_slice(&self.keys.hmac_key).expect("HMAC accepts any key length");
		mac.update(w.as_slice());
		mac.update(ciphertext);
		mac.finalize().into_bytes().into()
	}
}

#[cfg(test)]
mod tests {
	use wire::{MessageType, SessionId};

	use super::*;
	use crate::keyagreement::LocalKeyMaterial;

	fn paired_cryptors() -> (Cryptor, Cryptor) {
		let mut rng = rand::rngs::OsRng;
		let a = LocalKeyMaterial::generate(&mut rng);
		let b = LocalKeyMaterial::generate(&mut rng);
		let (ax, ay) = a.public_xy();
		let (bx, by) = b.public_xy();
		(Cryptor::new(a.agree(&bx, &by).unwrap()), Cryptor::new(b.agree(&ax, &ay).unwrap()))
	}

	fn header_with_size(size: u32) -> CommonHeader {
		let mut h = CommonHeader::new(MessageType::Session, SessionId::new(1, 2));
		h.payload_size = size;
		h
	}

	#[test]
	fn round_trips_plaintext() {
		let (sender, receiver) = paired_cryptors();
		let plaintext = b"fetch the bytes please";

		let mut header = header_with_size(0);
		header.payload_size = Cryptor::sealed_len(plaintext.len()) as u32;

		let body = sender.encrypt(&header, plaintext);
		assert_eq!(body.len(), header.payload_size as usize);

		let decrypted = receiver.decrypt(&header, &body).unwrap();
		assert_eq!(decrypted, plaintext);
	}

	#[test]
	fn flipping_a_ciphertext_bit_fails_integrity() {
		let (sender, receiver) = paired_cryptors();
		let plaintext = b"important bytes";

		let mut header = header_with_size(0);
		header.payload_size = Cryptor::sealed_len(plaintext.len()) as u32;

		let mut body = sender.encrypt(&header, plaintext);
		body[0] ^= 0x01;

		assert_eq!(receiver.decrypt(&header, &body), Err(Error::IntegrityFailure));
	}

	#[test]
	fn flipping_a_header_bit_fails_integrity() {
		let (sender, receiver) = paired_cryptors();
		let plaintext = b"important bytes";

		let mut header = header_with_size(0);
		header.payload_size = Cryptor::sealed_len(plaintext.len()) as u32;

		let body = sender.encrypt(&header, plaintext);

		let mut tampered = header.clone();
		tampered.sequence_number += 1;

		assert_eq!(receiver.decrypt(&tampered, &body), Err(Error::IntegrityFailure));
	}
}
