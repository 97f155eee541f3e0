//! Authenticated Encryption with Associated Data (AEAD).
//!
//! Uses ChaCha20-Poly1305 for record sealing. This cipher is:
//! - Fast in software (no hardware AES required)
//! - Constant-time (resistant to timing attacks)
//! - Widely deployed (TLS 1.3, WireGuard, etc.)

use chacha20poly1305::{
    aead::{Aead as AeadTrait, KeyInit, Payload},
    ChaCha20Poly1305,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// A symmetric key for AEAD operations.
///
/// Automatically zeroized when dropped.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a new AEAD key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for AeadKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A nonce (number used once) for AEAD operations.
///
/// Each record's nonce is the session's 12-byte direction prefix with the
/// record sequence XORed into the low-order 8 bytes; the high 4 prefix
/// bytes pass through untouched. Sequence uniqueness therefore guarantees
/// nonce uniqueness per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Build the record nonce for `seq` under the given direction prefix.
    ///
    /// The sequence is encoded big-endian and XORed into bytes 4..12.
    pub fn from_prefix_and_seq(prefix: &[u8; NONCE_SIZE], seq: u64) -> Self {
        let mut nonce = *prefix;
        let seq_bytes = seq.to_be_bytes();
        for (n, s) in nonce[4..].iter_mut().zip(seq_bytes.iter()) {
            *n ^= s;
        }
        Self(nonce)
    }

    /// Create a nonce from raw bytes.
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// ChaCha20-Poly1305 AEAD cipher bound to one key.
pub struct Aead {
    cipher: ChaCha20Poly1305,
}

impl Aead {
    /// Create a new AEAD instance with the given key.
    pub fn new(key: &AeadKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Seal plaintext with associated authenticated data.
    ///
    /// Returns ciphertext || tag (16 bytes appended).
    ///
    /// # Arguments
    ///
    /// * `nonce` - Must be unique for this key
    /// * `plaintext` - Data to encrypt
    /// * `aad` - Additional data to authenticate (but not encrypt)
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };

        self.cipher
            .encrypt(nonce.as_bytes().into(), payload)
            .map_err(|_| Error::crypto("sealing failed"))
    }

    /// Open ciphertext with associated authenticated data.
    ///
    /// # Arguments
    ///
    /// * `nonce` - Must match the nonce used for sealing
    /// * `ciphertext` - Encrypted data with appended tag
    /// * `aad` - Must match the AAD used for sealing
    ///
    /// # Errors
    ///
    /// Returns [`Error::AeadAuthFail`] if authentication fails (wrong key,
    /// tampered data, mismatched AAD).
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::malformed(format!(
                "ciphertext shorter than tag: {} bytes",
                ciphertext.len()
            )));
        }

        let payload = Payload {
            msg: ciphertext,
            aad,
        };

        self.cipher
            .decrypt(nonce.as_bytes().into(), payload)
            .map_err(|_| Error::AeadAuthFail)
    }
}

/// Calculate the ciphertext length for a given plaintext length.
pub const fn ciphertext_len(plaintext_len: usize) -> usize {
    plaintext_len + TAG_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> AeadKey {
        AeadKey::from_bytes([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
            0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
            0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17,
            0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
        ])
    }

    #[test]
    fn test_seal_open() {
        let key = test_key();
        let aead = Aead::new(&key);
        let nonce = Nonce::from_prefix_and_seq(&[0u8; NONCE_SIZE], 1);

        let plaintext = b"Hello, World!";
        let aad = b"header";

        let ciphertext = aead.seal(&nonce, plaintext, aad).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let opened = aead.open(&nonce, &ciphertext, aad).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = test_key();
        let key2 = AeadKey::from_bytes([0x42u8; KEY_SIZE]);

        let aead1 = Aead::new(&key1);
        let aead2 = Aead::new(&key2);
        let nonce = Nonce::from_prefix_and_seq(&[0u8; NONCE_SIZE], 1);

        let ciphertext = aead1.seal(&nonce, b"secret data", b"").unwrap();
        let result = aead2.open(&nonce, &ciphertext, b"");

        assert!(matches!(result, Err(Error::AeadAuthFail)));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = test_key();
        let aead = Aead::new(&key);
        let nonce = Nonce::from_prefix_and_seq(&[0u8; NONCE_SIZE], 1);

        let ciphertext = aead.seal(&nonce, b"secret data", b"header1").unwrap();
        let result = aead.open(&nonce, &ciphertext, b"header2");

        assert!(matches!(result, Err(Error::AeadAuthFail)));
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let key = test_key();
        let aead = Aead::new(&key);
        let prefix = [0x11u8; NONCE_SIZE];

        let ciphertext = aead
            .seal(&Nonce::from_prefix_and_seq(&prefix, 7), b"secret data", b"")
            .unwrap();
        let result = aead.open(&Nonce::from_prefix_and_seq(&prefix, 8), &ciphertext, b"");

        assert!(matches!(result, Err(Error::AeadAuthFail)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let aead = Aead::new(&key);
        let nonce = Nonce::from_prefix_and_seq(&[0u8; NONCE_SIZE], 1);

        let mut ciphertext = aead.seal(&nonce, b"secret data", b"").unwrap();
        for bit in [0usize, 7] {
            ciphertext[0] ^= 1 << bit;
            assert!(aead.open(&nonce, &ciphertext, b"").is_err());
            ciphertext[0] ^= 1 << bit;
        }

        // Untampered still opens
        assert!(aead.open(&nonce, &ciphertext, b"").is_ok());
    }

    #[test]
    fn test_nonce_prefix_xor() {
        let prefix: [u8; NONCE_SIZE] = [
            0xA0, 0xA1, 0xA2, 0xA3, 0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7,
        ];
        let nonce = Nonce::from_prefix_and_seq(&prefix, 0x0102030405060708);

        // High 4 bytes untouched
        assert_eq!(&nonce.as_bytes()[..4], &prefix[..4]);
        // Low 8 bytes are prefix XOR big-endian seq
        assert_eq!(
            &nonce.as_bytes()[4..],
            &[
                0xB0 ^ 0x01,
                0xB1 ^ 0x02,
                0xB2 ^ 0x03,
                0xB3 ^ 0x04,
                0xB4 ^ 0x05,
                0xB5 ^ 0x06,
                0xB6 ^ 0x07,
                0xB7 ^ 0x08
            ]
        );
    }

    #[test]
    fn test_short_ciphertext_is_malformed() {
        let key = test_key();
        let aead = Aead::new(&key);
        let nonce = Nonce::from_prefix_and_seq(&[0u8; NONCE_SIZE], 1);

        let result = aead.open(&nonce, &[0u8; TAG_SIZE - 1], b"");
        assert!(matches!(result, Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn test_ciphertext_length() {
        assert_eq!(ciphertext_len(0), TAG_SIZE);
        assert_eq!(ciphertext_len(100), 100 + TAG_SIZE);
    }
}
