//! Handshake wire messages.
//!
//! Two fixed-size messages, all multi-byte fields big-endian:
//!
//! ```text
//! INIT (78 bytes)                     RESPONSE (86 bytes)
//!   magic(4)        = "VEIL"            magic(4)        = "VEIL"
//!   version(1)      = 0x01              version(1)      = 0x01
//!   type(1)         = 0x01              type(1)         = 0x02
//!   client_pub(32)                      server_pub(32)
//!   client_nonce(16)                    server_nonce(16)
//!   timestamp_ms(8)                     session_id(8)   non-zero
//!   psk_tag(16)                         timestamp_ms(8)
//!                                       psk_tag(16)
//! ```
//!
//! The PSK tag is HMAC-SHA256 under the pre-shared key over every field
//! that precedes it; the RESPONSE tag additionally covers the client's
//! nonce, binding the reply to the request.

use bytes::BufMut;

use crate::crypto::{compute_psk_tag, verify_psk_tag, PublicKey, PSK_TAG_SIZE};
use crate::error::{Error, Result};
use crate::{PROTOCOL_VERSION, PSK_SIZE};

/// Protocol magic prefixing every handshake message.
pub const MAGIC: [u8; 4] = *b"VEIL";

/// Message type byte for INIT.
pub const TYPE_INIT: u8 = 0x01;

/// Message type byte for RESPONSE.
pub const TYPE_RESPONSE: u8 = 0x02;

/// Size of the client nonce.
pub const CLIENT_NONCE_SIZE: usize = 16;

/// Size of the server nonce.
pub const SERVER_NONCE_SIZE: usize = 16;

/// Encoded INIT size.
pub const INIT_SIZE: usize = 4 + 1 + 1 + 32 + CLIENT_NONCE_SIZE + 8 + PSK_TAG_SIZE;

/// Encoded RESPONSE size.
pub const RESPONSE_SIZE: usize = 4 + 1 + 1 + 32 + SERVER_NONCE_SIZE + 8 + 8 + PSK_TAG_SIZE;

/// Handshake INIT, initiator → responder.
#[derive(Debug, Clone)]
pub struct InitMessage {
    /// Protocol version byte
    pub version: u8,
    /// Initiator's ephemeral X25519 public key
    pub client_pub: PublicKey,
    /// Random nonce identifying this handshake attempt
    pub client_nonce: [u8; CLIENT_NONCE_SIZE],
    /// Sender's Unix time in milliseconds
    pub timestamp_ms: u64,
    /// Truncated HMAC over the preceding fields
    pub psk_tag: [u8; PSK_TAG_SIZE],
}

impl InitMessage {
    /// Build and authenticate a new INIT.
    pub fn new(
        psk: &[u8; PSK_SIZE],
        client_pub: PublicKey,
        client_nonce: [u8; CLIENT_NONCE_SIZE],
        timestamp_ms: u64,
    ) -> Self {
        let mut msg = Self {
            version: PROTOCOL_VERSION,
            client_pub,
            client_nonce,
            timestamp_ms,
            psk_tag: [0u8; PSK_TAG_SIZE],
        };
        msg.psk_tag = compute_psk_tag(psk, &msg.signed_fields());
        msg
    }

    fn signed_fields(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(INIT_SIZE - PSK_TAG_SIZE);
        buf.put_slice(&MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(TYPE_INIT);
        buf.put_slice(self.client_pub.as_bytes());
        buf.put_slice(&self.client_nonce);
        buf.put_u64(self.timestamp_ms);
        buf
    }

    /// Serialize to the 78-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.signed_fields();
        buf.put_slice(&self.psk_tag);
        buf
    }

    /// Parse the wire form, checking structure only (size, magic, type).
    ///
    /// Authentication and freshness are checked separately so that the
    /// caller controls logging and constant-time comparison happens against
    /// a fully parsed message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != INIT_SIZE {
            return Err(Error::HandshakeReject("INIT has wrong size"));
        }
        if bytes[..4] != MAGIC {
            return Err(Error::HandshakeReject("bad magic"));
        }
        if bytes[5] != TYPE_INIT {
            return Err(Error::HandshakeReject("not an INIT"));
        }

        let mut client_pub = [0u8; 32];
        client_pub.copy_from_slice(&bytes[6..38]);
        let mut client_nonce = [0u8; CLIENT_NONCE_SIZE];
        client_nonce.copy_from_slice(&bytes[38..54]);
        let timestamp_ms = u64::from_be_bytes(bytes[54..62].try_into().unwrap());
        let mut psk_tag = [0u8; PSK_TAG_SIZE];
        psk_tag.copy_from_slice(&bytes[62..78]);

        Ok(Self {
            version: bytes[4],
            client_pub: PublicKey::from_bytes(client_pub),
            client_nonce,
            timestamp_ms,
            psk_tag,
        })
    }

    /// Verify the PSK tag in constant time.
    pub fn verify_tag(&self, psk: &[u8; PSK_SIZE]) -> bool {
        verify_psk_tag(psk, &self.signed_fields(), &self.psk_tag)
    }
}

/// Handshake RESPONSE, responder → initiator.
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    /// Protocol version byte
    pub version: u8,
    /// Responder's ephemeral X25519 public key
    pub server_pub: PublicKey,
    /// Random nonce chosen by the responder
    pub server_nonce: [u8; SERVER_NONCE_SIZE],
    /// Responder-chosen session identifier, never zero
    pub session_id: u64,
    /// Sender's Unix time in milliseconds
    pub timestamp_ms: u64,
    /// Truncated HMAC over the preceding fields and the client nonce
    pub psk_tag: [u8; PSK_TAG_SIZE],
}

impl ResponseMessage {
    /// Build and authenticate a new RESPONSE bound to `client_nonce`.
    pub fn new(
        psk: &[u8; PSK_SIZE],
        server_pub: PublicKey,
        server_nonce: [u8; SERVER_NONCE_SIZE],
        session_id: u64,
        timestamp_ms: u64,
        client_nonce: &[u8; CLIENT_NONCE_SIZE],
    ) -> Self {
        let mut msg = Self {
            version: PROTOCOL_VERSION,
            server_pub,
            server_nonce,
            session_id,
            timestamp_ms,
            psk_tag: [0u8; PSK_TAG_SIZE],
        };
        msg.psk_tag = compute_psk_tag(psk, &msg.signed_fields(client_nonce));
        msg
    }

    fn signed_fields(&self, client_nonce: &[u8; CLIENT_NONCE_SIZE]) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(RESPONSE_SIZE - PSK_TAG_SIZE + CLIENT_NONCE_SIZE);
        buf.put_slice(&MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(TYPE_RESPONSE);
        buf.put_slice(self.server_pub.as_bytes());
        buf.put_slice(&self.server_nonce);
        buf.put_u64(self.session_id);
        buf.put_u64(self.timestamp_ms);
        buf.put_slice(client_nonce);
        buf
    }

    /// Serialize to the 86-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RESPONSE_SIZE);
        buf.put_slice(&MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(TYPE_RESPONSE);
        buf.put_slice(self.server_pub.as_bytes());
        buf.put_slice(&self.server_nonce);
        buf.put_u64(self.session_id);
        buf.put_u64(self.timestamp_ms);
        buf.put_slice(&self.psk_tag);
        buf
    }

    /// Parse the wire form, checking structure only (size, magic, type).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RESPONSE_SIZE {
            return Err(Error::HandshakeReject("RESPONSE has wrong size"));
        }
        if bytes[..4] != MAGIC {
            return Err(Error::HandshakeReject("bad magic"));
        }
        if bytes[5] != TYPE_RESPONSE {
            return Err(Error::HandshakeReject("not a RESPONSE"));
        }

        let mut server_pub = [0u8; 32];
        server_pub.copy_from_slice(&bytes[6..38]);
        let mut server_nonce = [0u8; SERVER_NONCE_SIZE];
        server_nonce.copy_from_slice(&bytes[38..54]);
        let session_id = u64::from_be_bytes(bytes[54..62].try_into().unwrap());
        let timestamp_ms = u64::from_be_bytes(bytes[62..70].try_into().unwrap());
        let mut psk_tag = [0u8; PSK_TAG_SIZE];
        psk_tag.copy_from_slice(&bytes[70..86]);

        Ok(Self {
            version: bytes[4],
            server_pub: PublicKey::from_bytes(server_pub),
            server_nonce,
            session_id,
            timestamp_ms,
            psk_tag,
        })
    }

    /// Verify the PSK tag in constant time.
    pub fn verify_tag(
        &self,
        psk: &[u8; PSK_SIZE],
        client_nonce: &[u8; CLIENT_NONCE_SIZE],
    ) -> bool {
        verify_psk_tag(psk, &self.signed_fields(client_nonce), &self.psk_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EphemeralSecret;

    fn test_psk() -> [u8; PSK_SIZE] {
        [0xAAu8; PSK_SIZE]
    }

    fn some_public() -> PublicKey {
        PublicKey::from(&EphemeralSecret::random())
    }

    #[test]
    fn test_init_roundtrip() {
        let psk = test_psk();
        let msg = InitMessage::new(&psk, some_public(), [0x01; CLIENT_NONCE_SIZE], 1_700_000_000_000);

        let bytes = msg.encode();
        assert_eq!(bytes.len(), INIT_SIZE);
        assert_eq!(&bytes[..4], b"VEIL");
        assert_eq!(bytes[4], PROTOCOL_VERSION);
        assert_eq!(bytes[5], TYPE_INIT);

        let parsed = InitMessage::decode(&bytes).unwrap();
        assert_eq!(parsed.client_pub, msg.client_pub);
        assert_eq!(parsed.client_nonce, msg.client_nonce);
        assert_eq!(parsed.timestamp_ms, msg.timestamp_ms);
        assert!(parsed.verify_tag(&psk));
    }

    #[test]
    fn test_response_roundtrip() {
        let psk = test_psk();
        let client_nonce = [0x01u8; CLIENT_NONCE_SIZE];
        let msg = ResponseMessage::new(
            &psk,
            some_public(),
            [0x02; SERVER_NONCE_SIZE],
            0xDEADBEEFCAFEBABE,
            1_700_000_000_000,
            &client_nonce,
        );

        let bytes = msg.encode();
        assert_eq!(bytes.len(), RESPONSE_SIZE);
        assert_eq!(bytes[5], TYPE_RESPONSE);

        let parsed = ResponseMessage::decode(&bytes).unwrap();
        assert_eq!(parsed.session_id, 0xDEADBEEFCAFEBABE);
        assert_eq!(parsed.server_nonce, msg.server_nonce);
        assert!(parsed.verify_tag(&psk, &client_nonce));
    }

    #[test]
    fn test_init_structural_rejects() {
        let psk = test_psk();
        let msg = InitMessage::new(&psk, some_public(), [0x01; CLIENT_NONCE_SIZE], 0);
        let good = msg.encode();

        // Wrong size
        assert!(InitMessage::decode(&good[..INIT_SIZE - 1]).is_err());

        // Bad magic
        let mut bad = good.clone();
        bad[0] = b'X';
        assert!(InitMessage::decode(&bad).is_err());

        // Wrong type byte
        let mut bad = good.clone();
        bad[5] = TYPE_RESPONSE;
        assert!(InitMessage::decode(&bad).is_err());
    }

    #[test]
    fn test_tag_binds_every_field() {
        let psk = test_psk();
        let msg = InitMessage::new(&psk, some_public(), [0x01; CLIENT_NONCE_SIZE], 42);
        let good = msg.encode();

        // Any flipped bit in the signed prefix invalidates the tag
        for offset in [4usize, 6, 40, 55] {
            let mut bad = good.clone();
            bad[offset] ^= 0x01;
            let parsed = InitMessage::decode(&bad);
            if let Ok(parsed) = parsed {
                assert!(!parsed.verify_tag(&psk), "offset {offset}");
            }
        }

        // Wrong PSK fails
        let parsed = InitMessage::decode(&good).unwrap();
        assert!(!parsed.verify_tag(&[0xBBu8; PSK_SIZE]));
    }

    #[test]
    fn test_response_tag_binds_client_nonce() {
        let psk = test_psk();
        let client_nonce = [0x07u8; CLIENT_NONCE_SIZE];
        let msg = ResponseMessage::new(
            &psk,
            some_public(),
            [0x02; SERVER_NONCE_SIZE],
            99,
            0,
            &client_nonce,
        );
        let parsed = ResponseMessage::decode(&msg.encode()).unwrap();

        assert!(parsed.verify_tag(&psk, &client_nonce));
        assert!(!parsed.verify_tag(&psk, &[0x08u8; CLIENT_NONCE_SIZE]));
    }
}
