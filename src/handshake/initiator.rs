//! Initiator side of the handshake.

use tokio::time::{timeout_at, Duration, Instant};

use crate::crypto::{EphemeralSecret, PublicKey, SecureRandom, SessionKeys};
use crate::error::{Error, Result};
use crate::session::{Role, Session};
use crate::transport::Datagram;
use crate::Config;

use super::message::{InitMessage, ResponseMessage, CLIENT_NONCE_SIZE};
use super::{
    schedule_info, unix_millis_now, version_ok, within_skew, BACKOFF_CAP_MS,
    INITIAL_BACKOFF_MS, MAX_ATTEMPTS,
};

/// Initiator state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// INIT built but not yet handed to the transport
    Idle,
    /// INIT on the wire, waiting for a RESPONSE
    SentInit,
    /// Session installed
    Established,
    /// Gave up; a fresh [`Initiator`] is required to retry
    Failed,
}

/// Handshake initiator.
///
/// Owns the ephemeral secret and the encoded INIT for the lifetime of one
/// attempt. The INIT bytes are stable across retransmissions, so a
/// responder seeing duplicates replies identically.
pub struct Initiator {
    config: Config,
    secret: Option<EphemeralSecret>,
    client_nonce: [u8; CLIENT_NONCE_SIZE],
    init_bytes: Vec<u8>,
    state: HandshakeState,
}

impl Initiator {
    /// Build a new handshake attempt: fresh ephemeral key, fresh nonce.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let secret = EphemeralSecret::random();
        let public = PublicKey::from(&secret);
        let client_nonce: [u8; CLIENT_NONCE_SIZE] = SecureRandom::bytes();

        let init = InitMessage::new(&config.psk, public, client_nonce, unix_millis_now());

        Ok(Self {
            config,
            secret: Some(secret),
            client_nonce,
            init_bytes: init.encode(),
            state: HandshakeState::Idle,
        })
    }

    /// Current state machine position.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The encoded INIT to (re)transmit.
    ///
    /// Marks the handshake as in flight on first use.
    pub fn init_message(&mut self) -> &[u8] {
        if self.state == HandshakeState::Idle {
            self.state = HandshakeState::SentInit;
        }
        &self.init_bytes
    }

    /// Validate a datagram as the RESPONSE and install the session.
    ///
    /// A rejection leaves the handshake in flight: the datagram may simply
    /// be noise or a forgery, and the genuine RESPONSE can still arrive.
    pub fn process_response(&mut self, datagram: &[u8]) -> Result<Session> {
        if self.state != HandshakeState::SentInit {
            return Err(Error::HandshakeReject("no handshake in flight"));
        }

        let msg = ResponseMessage::decode(datagram)?;

        if !version_ok(msg.version, self.config.allow_prerelease_version) {
            return Err(Error::HandshakeReject("unsupported protocol version"));
        }
        if !msg.verify_tag(&self.config.psk, &self.client_nonce) {
            return Err(Error::HandshakeReject("PSK tag mismatch"));
        }

        let now = unix_millis_now();
        if !within_skew(now, msg.timestamp_ms, self.config.max_clock_skew_ms) {
            tracing::warn!(
                local = now,
                remote = msg.timestamp_ms,
                "RESPONSE timestamp outside skew window"
            );
            return Err(Error::HandshakeReject("timestamp skew too large"));
        }
        if msg.session_id == 0 {
            return Err(Error::HandshakeReject("zero session id"));
        }

        // Authenticated and fresh; the ephemeral secret is spent here.
        let secret = self
            .secret
            .take()
            .ok_or(Error::HandshakeReject("no handshake in flight"))?;
        let shared = secret.diffie_hellman(&msg.server_pub);

        let info = schedule_info(
            &self.config.info,
            &self.client_nonce,
            &msg.server_nonce,
            msg.session_id,
        );
        let keys = SessionKeys::derive(&shared, &self.config.psk, &info, true);

        self.state = HandshakeState::Established;
        tracing::info!(session_id = msg.session_id, "handshake established");

        Ok(Session::new(msg.session_id, Role::Initiator, keys, &self.config))
    }

    /// Mark the attempt as failed (deadline exhausted, transport gone).
    pub fn fail(&mut self) {
        self.state = HandshakeState::Failed;
    }
}

/// Run a complete handshake against a datagram transport.
///
/// Retransmits INIT with exponential backoff (500 ms doubling to a 4 s cap,
/// at most 5 transmissions) under the overall `handshake_timeout_ms`
/// deadline. Invalid datagrams received while waiting are ignored; only the
/// deadline or a transport error ends the attempt.
pub async fn connect<T: Datagram>(transport: &mut T, config: Config) -> Result<Session> {
    let timeout_ms = config.handshake_timeout_ms;
    let mut initiator = Initiator::new(config)?;

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);

    for _ in 0..MAX_ATTEMPTS {
        transport.send(initiator.init_message()).await?;

        let wait_until = deadline.min(Instant::now() + backoff);
        loop {
            match timeout_at(wait_until, transport.recv()).await {
                Ok(Ok(datagram)) => match initiator.process_response(&datagram) {
                    Ok(session) => return Ok(session),
                    Err(Error::HandshakeReject(reason)) => {
                        tracing::debug!(reason, "ignoring datagram while waiting for RESPONSE");
                    }
                    Err(other) => {
                        initiator.fail();
                        return Err(other);
                    }
                },
                Ok(Err(io_err)) => {
                    initiator.fail();
                    return Err(io_err.into());
                }
                // Backoff elapsed: retransmit
                Err(_) => break,
            }
        }

        if Instant::now() >= deadline {
            break;
        }
        backoff = (backoff * 2).min(Duration::from_millis(BACKOFF_CAP_MS));
    }

    initiator.fail();
    Err(Error::HandshakeTimeout(timeout_ms))
}
