//! Session key schedule.
//!
//! A single HKDF-SHA256 extract (salt = PSK, ikm = X25519 shared secret)
//! feeds two expansions: one for the directional AEAD keys and nonce
//! prefixes, one for the sequence-obfuscation keys. Both endpoints run the
//! same schedule; the role flag only selects which half is `send` and which
//! is `recv`, so the symmetry invariant holds by construction.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{AeadKey, SharedSecret, KEY_SIZE, NONCE_SIZE, PSK_TAG_SIZE};

/// Expansion label for AEAD keys and nonce prefixes.
const SESSION_LABEL: &[u8] = b"veil-session-v1";

/// Expansion label for sequence-obfuscation keys.
const SEQ_OBF_LABEL: &[u8] = b"veil-seq-obf-v1";

/// Directional key material for one session.
///
/// Derived exactly once at handshake completion and immutable thereafter.
/// The initiator's `send_*` equals the responder's `recv_*` bit for bit,
/// and vice versa. All fields are zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    send_key: [u8; KEY_SIZE],
    recv_key: [u8; KEY_SIZE],
    send_nonce_prefix: [u8; NONCE_SIZE],
    recv_nonce_prefix: [u8; NONCE_SIZE],
    send_seq_key: [u8; KEY_SIZE],
    recv_seq_key: [u8; KEY_SIZE],
}

impl SessionKeys {
    /// Derive the full key schedule from a DH shared secret.
    ///
    /// # Arguments
    ///
    /// * `shared_secret` - The result of the X25519 exchange
    /// * `psk` - 32-byte pre-shared key, used as the HKDF salt
    /// * `info` - `client_nonce || server_nonce || session_id`, plus any
    ///   caller-supplied domain separator
    /// * `is_initiator` - Selects which derived half is the send direction
    pub fn derive(
        shared_secret: &SharedSecret,
        psk: &[u8; KEY_SIZE],
        info: &[u8],
        is_initiator: bool,
    ) -> Self {
        let hkdf = Hkdf::<Sha256>::new(Some(psk), shared_secret.as_bytes());

        // 88-byte block: key A (32) || key B (32) || prefix NA (12) || prefix NB (12)
        let mut session_info = Vec::with_capacity(info.len() + SESSION_LABEL.len());
        session_info.extend_from_slice(info);
        session_info.extend_from_slice(SESSION_LABEL);

        let mut block = [0u8; 2 * KEY_SIZE + 2 * NONCE_SIZE];
        // Output lengths are fixed and well below the HKDF limit
        hkdf.expand(&session_info, &mut block).unwrap();

        // 64-byte block: seq key SA (32) || seq key SB (32)
        let mut seq_info = Vec::with_capacity(info.len() + SEQ_OBF_LABEL.len());
        seq_info.extend_from_slice(info);
        seq_info.extend_from_slice(SEQ_OBF_LABEL);

        let mut seq_block = [0u8; 2 * KEY_SIZE];
        hkdf.expand(&seq_info, &mut seq_block).unwrap();

        let mut key_a = [0u8; KEY_SIZE];
        let mut key_b = [0u8; KEY_SIZE];
        let mut prefix_a = [0u8; NONCE_SIZE];
        let mut prefix_b = [0u8; NONCE_SIZE];
        let mut seq_a = [0u8; KEY_SIZE];
        let mut seq_b = [0u8; KEY_SIZE];

        key_a.copy_from_slice(&block[..KEY_SIZE]);
        key_b.copy_from_slice(&block[KEY_SIZE..2 * KEY_SIZE]);
        prefix_a.copy_from_slice(&block[2 * KEY_SIZE..2 * KEY_SIZE + NONCE_SIZE]);
        prefix_b.copy_from_slice(&block[2 * KEY_SIZE + NONCE_SIZE..]);
        seq_a.copy_from_slice(&seq_block[..KEY_SIZE]);
        seq_b.copy_from_slice(&seq_block[KEY_SIZE..]);

        block.zeroize();
        seq_block.zeroize();

        if is_initiator {
            Self {
                send_key: key_a,
                recv_key: key_b,
                send_nonce_prefix: prefix_a,
                recv_nonce_prefix: prefix_b,
                send_seq_key: seq_a,
                recv_seq_key: seq_b,
            }
        } else {
            Self {
                send_key: key_b,
                recv_key: key_a,
                send_nonce_prefix: prefix_b,
                recv_nonce_prefix: prefix_a,
                send_seq_key: seq_b,
                recv_seq_key: seq_a,
            }
        }
    }

    /// Get the outbound AEAD key.
    pub fn send_key(&self) -> AeadKey {
        AeadKey::from_bytes(self.send_key)
    }

    /// Get the inbound AEAD key.
    pub fn recv_key(&self) -> AeadKey {
        AeadKey::from_bytes(self.recv_key)
    }

    /// Get the outbound nonce prefix.
    pub fn send_nonce_prefix(&self) -> &[u8; NONCE_SIZE] {
        &self.send_nonce_prefix
    }

    /// Get the inbound nonce prefix.
    pub fn recv_nonce_prefix(&self) -> &[u8; NONCE_SIZE] {
        &self.recv_nonce_prefix
    }

    /// Get the outbound sequence-obfuscation key.
    pub fn send_seq_key(&self) -> &[u8; KEY_SIZE] {
        &self.send_seq_key
    }

    /// Get the inbound sequence-obfuscation key.
    pub fn recv_seq_key(&self) -> &[u8; KEY_SIZE] {
        &self.recv_seq_key
    }
}

/// Compute the truncated HMAC-SHA256 tag authenticating a handshake message.
///
/// Returns the first 16 bytes of HMAC-SHA256(psk, data).
pub fn compute_psk_tag(psk: &[u8; KEY_SIZE], data: &[u8]) -> [u8; PSK_TAG_SIZE] {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(psk).expect("HMAC can take key of any size");
    mac.update(data);
    let result = mac.finalize().into_bytes();

    let mut tag = [0u8; PSK_TAG_SIZE];
    tag.copy_from_slice(&result[..PSK_TAG_SIZE]);
    tag
}

/// Verify a handshake PSK tag.
///
/// Constant-time comparison.
pub fn verify_psk_tag(
    psk: &[u8; KEY_SIZE],
    data: &[u8],
    expected_tag: &[u8; PSK_TAG_SIZE],
) -> bool {
    let computed = compute_psk_tag(psk, data);
    computed
        .iter()
        .zip(expected_tag.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
