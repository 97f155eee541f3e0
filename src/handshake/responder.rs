//! Responder side of the handshake.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::crypto::{EphemeralSecret, PublicKey, SecureRandom, SessionKeys};
use crate::error::{Error, Result};
use crate::session::{Role, Session};
use crate::Config;

use super::message::{
    InitMessage, ResponseMessage, CLIENT_NONCE_SIZE, SERVER_NONCE_SIZE,
};
use super::{schedule_info, unix_millis_now, version_ok, within_skew};

/// How long a RESPONSE stays replayable for duplicate INITs.
const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(30);

/// A recently emitted RESPONSE, kept so retransmitted INITs are idempotent.
struct CachedResponse {
    bytes: Vec<u8>,
    created: Instant,
}

/// Handshake responder.
///
/// Stateless per INIT: every valid INIT yields a RESPONSE and a fully
/// installed session in one step. The only retained state is a bounded
/// cache of recent RESPONSEs keyed by client nonce, so a retransmitted
/// INIT re-elicits the identical RESPONSE instead of a second session.
pub struct Responder {
    config: Config,
    cache: Mutex<HashMap<[u8; CLIENT_NONCE_SIZE], CachedResponse>>,
}

impl Responder {
    /// Create a responder for the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Process a datagram that may be an INIT.
    ///
    /// On success returns the RESPONSE to send back and, for a first-time
    /// INIT, the installed session; a duplicate INIT returns the cached
    /// RESPONSE bytes with `None`.
    ///
    /// On error the caller must send nothing: authentication and format
    /// failures are silently dropped so the responder is not a validity
    /// oracle.
    pub fn handle_init(&self, datagram: &[u8]) -> Result<(Vec<u8>, Option<Session>)> {
        let msg = InitMessage::decode(datagram)?;

        if !version_ok(msg.version, self.config.allow_prerelease_version) {
            return Err(Error::HandshakeReject("unsupported protocol version"));
        }
        if !msg.verify_tag(&self.config.psk) {
            return Err(Error::HandshakeReject("PSK tag mismatch"));
        }

        let now = unix_millis_now();
        if !within_skew(now, msg.timestamp_ms, self.config.max_clock_skew_ms) {
            tracing::warn!(
                local = now,
                remote = msg.timestamp_ms,
                "rejecting INIT outside clock skew window"
            );
            return Err(Error::HandshakeReject("timestamp skew too large"));
        }

        {
            let mut cache = self.cache.lock();
            cache.retain(|_, cached| cached.created.elapsed() < RESPONSE_CACHE_TTL);
            if let Some(cached) = cache.get(&msg.client_nonce) {
                tracing::debug!("duplicate INIT, re-emitting cached RESPONSE");
                return Ok((cached.bytes.clone(), None));
            }
        }

        let secret = EphemeralSecret::random();
        let server_pub = PublicKey::from(&secret);
        let server_nonce: [u8; SERVER_NONCE_SIZE] = SecureRandom::bytes();
        let session_id = SecureRandom::nonzero_u64();

        let response = ResponseMessage::new(
            &self.config.psk,
            server_pub,
            server_nonce,
            session_id,
            now,
            &msg.client_nonce,
        );
        let response_bytes = response.encode();

        let shared = secret.diffie_hellman(&msg.client_pub);
        let info = schedule_info(
            &self.config.info,
            &msg.client_nonce,
            &server_nonce,
            session_id,
        );
        let keys = SessionKeys::derive(&shared, &self.config.psk, &info, false);
        let session = Session::new(session_id, Role::Responder, keys, &self.config);

        self.cache.lock().insert(
            msg.client_nonce,
            CachedResponse {
                bytes: response_bytes.clone(),
                created: Instant::now(),
            },
        );

        tracing::info!(session_id, "handshake established");
        Ok((response_bytes, Some(session)))
    }

    /// Number of RESPONSEs currently cached (for observability).
    pub fn cached_responses(&self) -> usize {
        self.cache.lock().len()
    }
}
