//! Two-message PSK-authenticated handshake.
//!
//! The initiator sends INIT, the responder replies with RESPONSE, and both
//! sides derive the session key schedule from the X25519 shared secret:
//!
//! ```text
//! Initiator                                Responder
//!   |                                          |
//!   |  INIT (pub key, nonce, timestamp, tag)   |
//!   |----------------------------------------->|
//!   |                          verify PSK tag  |
//!   |                          check skew      |
//!   |                          derive keys     |
//!   |                          install session |
//!   |  RESPONSE (pub key, nonce, session id)   |
//!   |<-----------------------------------------|
//!   |  verify PSK tag, derive keys             |
//!   |  install session                         |
//!   |                                          |
//!   | ═══════════ sealed records ═══════════   |
//! ```
//!
//! Anything that fails validation is dropped without a reply: an attacker
//! probing the port learns nothing, and malformed datagrams cannot make
//! the responder allocate state. Only the initiator keeps a state machine
//! (`Idle → SentInit → Established | Failed`); the responder is stateless
//! apart from a short-lived RESPONSE cache that makes duplicate INITs
//! idempotent.

pub mod message;

mod initiator;
mod responder;

pub use initiator::{connect, HandshakeState, Initiator};
pub use message::{InitMessage, ResponseMessage};
pub use responder::Responder;

use crate::PROTOCOL_VERSION;

/// First retransmit delay.
pub(crate) const INITIAL_BACKOFF_MS: u64 = 500;

/// Retransmit delay ceiling.
pub(crate) const BACKOFF_CAP_MS: u64 = 4_000;

/// Maximum INIT transmissions per handshake.
pub(crate) const MAX_ATTEMPTS: u32 = 5;

/// Current Unix time in milliseconds.
pub(crate) fn unix_millis_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Accept a peer's timestamp if it is within the configured skew.
pub(crate) fn within_skew(now_ms: u64, timestamp_ms: u64, max_skew_ms: u64) -> bool {
    now_ms.abs_diff(timestamp_ms) <= max_skew_ms
}

/// Accept the peer's protocol version byte.
pub(crate) fn version_ok(version: u8, allow_prerelease: bool) -> bool {
    version == PROTOCOL_VERSION || (allow_prerelease && version > PROTOCOL_VERSION)
}

/// Build the key-schedule info string: the caller's domain separator
/// followed by `client_nonce || server_nonce || session_id`.
pub(crate) fn schedule_info(
    domain: &[u8],
    client_nonce: &[u8; message::CLIENT_NONCE_SIZE],
    server_nonce: &[u8; message::SERVER_NONCE_SIZE],
    session_id: u64,
) -> Vec<u8> {
    let mut info = Vec::with_capacity(
        domain.len() + message::CLIENT_NONCE_SIZE + message::SERVER_NONCE_SIZE + 8,
    );
    info.extend_from_slice(domain);
    info.extend_from_slice(client_nonce);
    info.extend_from_slice(server_nonce);
    info.extend_from_slice(&session_id.to_be_bytes());
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::compute_psk_tag;
    use crate::error::Error;
    use crate::session::Frame;
    use crate::{Config, PSK_SIZE};

    fn test_config() -> Config {
        Config::new([0xAA; PSK_SIZE])
    }

    #[test]
    fn test_full_handshake_and_traffic() {
        let responder = Responder::new(test_config()).unwrap();
        let mut initiator = Initiator::new(test_config()).unwrap();

        let init = initiator.init_message().to_vec();
        assert_eq!(initiator.state(), HandshakeState::SentInit);

        let (response, session) = responder.handle_init(&init).unwrap();
        let responder_session = session.expect("fresh INIT installs a session");

        let initiator_session = initiator.process_response(&response).unwrap();
        assert_eq!(initiator.state(), HandshakeState::Established);
        assert_eq!(initiator_session.id(), responder_session.id());

        // Scenario: "Hello" across the freshly established pair
        let records = initiator_session.encrypt_data(b"Hello").unwrap();
        let frames = responder_session.decrypt_record(&records[0]).unwrap();
        assert_eq!(
            frames,
            vec![Frame::Data {
                stream_id: 0,
                payload: b"Hello".to_vec(),
            }]
        );

        // And the other direction
        let records = responder_session.encrypt_data(b"olleH").unwrap();
        assert!(initiator_session.decrypt_record(&records[0]).is_ok());
    }

    #[test]
    fn test_duplicate_init_is_idempotent() {
        let responder = Responder::new(test_config()).unwrap();
        let mut initiator = Initiator::new(test_config()).unwrap();
        let init = initiator.init_message().to_vec();

        let (first_response, first_session) = responder.handle_init(&init).unwrap();
        assert!(first_session.is_some());

        // Retransmitted INIT: identical RESPONSE, no second session
        let (second_response, second_session) = responder.handle_init(&init).unwrap();
        assert_eq!(first_response, second_response);
        assert!(second_session.is_none());

        // The initiator can complete from the duplicate copy
        assert!(initiator.process_response(&second_response).is_ok());
    }

    #[test]
    fn test_wrong_psk_rejected_both_ways() {
        let mut other = test_config();
        other.psk = [0xBB; PSK_SIZE];

        // Responder rejects an INIT under a different PSK
        let responder = Responder::new(test_config()).unwrap();
        let mut foreign = Initiator::new(other.clone()).unwrap();
        assert!(matches!(
            responder.handle_init(foreign.init_message()),
            Err(Error::HandshakeReject(_))
        ));

        // Initiator rejects a RESPONSE under a different PSK
        let foreign_responder = Responder::new(other).unwrap();
        let mut initiator = Initiator::new(test_config()).unwrap();
        let init = initiator.init_message().to_vec();
        // Re-sign the INIT so the foreign responder accepts it
        let mut resigned = init.clone();
        let tag = compute_psk_tag(&[0xBB; PSK_SIZE], &init[..init.len() - 16]);
        resigned[62..].copy_from_slice(&tag);
        let (response, _) = foreign_responder.handle_init(&resigned).unwrap();
        assert!(matches!(
            initiator.process_response(&response),
            Err(Error::HandshakeReject(_))
        ));
    }

    #[test]
    fn test_tampered_init_rejected() {
        let responder = Responder::new(test_config()).unwrap();
        let mut initiator = Initiator::new(test_config()).unwrap();
        let good = initiator.init_message().to_vec();

        for offset in [0usize, 4, 5, 10, 45, 60, 70] {
            let mut bad = good.clone();
            bad[offset] ^= 0x01;
            assert!(
                responder.handle_init(&bad).is_err(),
                "flipped byte {offset} accepted"
            );
        }

        // Truncation
        assert!(responder.handle_init(&good[..good.len() - 1]).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let config = test_config();
        let responder = Responder::new(config.clone()).unwrap();
        let mut initiator = Initiator::new(config.clone()).unwrap();
        let good = initiator.init_message().to_vec();

        // Rewrite the timestamp to well outside the skew window and re-sign
        let stale = unix_millis_now() - config.max_clock_skew_ms - 10_000;
        let mut bad = good;
        bad[54..62].copy_from_slice(&stale.to_be_bytes());
        let tag = compute_psk_tag(&config.psk, &bad[..62]);
        bad[62..].copy_from_slice(&tag);

        assert!(matches!(
            responder.handle_init(&bad),
            Err(Error::HandshakeReject("timestamp skew too large"))
        ));
    }

    #[test]
    fn test_unknown_version_rejected_unless_prerelease() {
        let config = test_config();
        let mut initiator = Initiator::new(config.clone()).unwrap();
        let good = initiator.init_message().to_vec();

        // Patch the version byte to a future version and re-sign
        let mut future = good;
        future[4] = PROTOCOL_VERSION + 1;
        let tag = compute_psk_tag(&config.psk, &future[..62]);
        future[62..].copy_from_slice(&tag);

        let strict = Responder::new(config.clone()).unwrap();
        assert!(matches!(
            strict.handle_init(&future),
            Err(Error::HandshakeReject("unsupported protocol version"))
        ));

        let mut lax_config = config;
        lax_config.allow_prerelease_version = true;
        let lax = Responder::new(lax_config).unwrap();
        assert!(lax.handle_init(&future).is_ok());
    }

    #[test]
    fn test_response_before_init_rejected() {
        let responder = Responder::new(test_config()).unwrap();
        let mut sender = Initiator::new(test_config()).unwrap();
        let (response, _) = responder.handle_init(sender.init_message()).unwrap();

        // A different initiator that never sent this INIT
        let mut bystander = Initiator::new(test_config()).unwrap();
        assert!(bystander.process_response(&response).is_err());
        assert_eq!(bystander.state(), HandshakeState::Idle);
    }

    #[test]
    fn test_second_response_ignored() {
        let responder = Responder::new(test_config()).unwrap();
        let mut initiator = Initiator::new(test_config()).unwrap();
        let init = initiator.init_message().to_vec();
        let (response, _) = responder.handle_init(&init).unwrap();

        assert!(initiator.process_response(&response).is_ok());
        assert!(matches!(
            initiator.process_response(&response),
            Err(Error::HandshakeReject(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_over_channel_transport() {
        let (mut client_side, mut server_side) = crate::transport::testing::pair();

        let server = tokio::spawn(async move {
            let responder = Responder::new(test_config()).unwrap();
            loop {
                let datagram = crate::transport::Datagram::recv(&mut server_side)
                    .await
                    .unwrap();
                match responder.handle_init(&datagram) {
                    Ok((response, session)) => {
                        crate::transport::Datagram::send(&mut server_side, &response)
                            .await
                            .unwrap();
                        if let Some(session) = session {
                            return session;
                        }
                    }
                    Err(_) => continue,
                }
            }
        });

        let initiator_session = connect(&mut client_side, test_config()).await.unwrap();
        let responder_session = server.await.unwrap();

        assert_eq!(initiator_session.id(), responder_session.id());

        let record = initiator_session.encrypt_data(b"over the wire").unwrap();
        assert!(responder_session.decrypt_record(&record[0]).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_and_retransmits() {
        let (mut client_side, mut server_side) = crate::transport::testing::pair();

        let mut config = test_config();
        config.handshake_timeout_ms = 1_500;

        let result = connect(&mut client_side, config).await;
        assert!(matches!(result, Err(Error::HandshakeTimeout(1_500))));

        // The INIT was retransmitted at least once under the deadline
        let mut inits = 0;
        while let Ok(datagram) =
            tokio::time::timeout(std::time::Duration::from_millis(1), async {
                crate::transport::Datagram::recv(&mut server_side).await
            })
            .await
        {
            datagram.unwrap();
            inits += 1;
        }
        assert!(inits >= 2, "expected retransmissions, saw {inits}");
    }
}
