//! Transport session: the per-connection encrypt/decrypt pipeline.
//!
//! A [`Session`] owns the directional keys, the monotonic send counter, the
//! replay window, and traffic statistics. It is created at handshake
//! completion and lives until [`Session::shutdown`] or a fatal failure.
//!
//! ## Concurrency contract
//!
//! Send state and receive state sit behind separate locks, so one send task
//! and one receive task can share an `Arc<Session>` without contending.
//! Running several tasks on the *same* direction of the same session is
//! safe but serializes; partition sessions across workers instead.
//! Statistics are plain atomics, readable from anywhere.
//!
//! ## Failure discipline
//!
//! Per-record decode failures never reach the payload sink: the receive
//! loop gets a recoverable error, the session bumps a drop counter, and
//! nothing else changes. In particular a failed AEAD open leaves the
//! replay window byte-identical, so forged traffic cannot advance state.

pub mod mux;
pub mod record;
pub mod replay;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use zeroize::Zeroize;

use crate::crypto::{Aead, Nonce, SequenceObfuscator, SessionKeys, NONCE_SIZE};
use crate::error::{Error, Result};
use crate::Config;

pub use mux::{Frame, FrameKind, StreamId};
pub use record::{RecordHeader, MIN_RECORD_SIZE, RECORD_HEADER_SIZE};
pub use replay::ReplayWindow;

/// Sequence numbers stop here; the session must be replaced by a new
/// handshake long before this is reachable in practice.
const SEQ_CEILING: u64 = 1 << 63;

/// First sequence number a session sends.
const INITIAL_SEQ: u64 = 1;

/// Which side of the handshake this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent INIT, received RESPONSE
    Initiator,
    /// Received INIT, sent RESPONSE
    Responder,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Keys installed, traffic flowing
    Established,
    /// Send counter hit its ceiling; receiving still works
    Exhausted,
    /// Shut down; key material wiped
    Closed,
}

/// Key material and transforms for one direction.
struct DirectionCrypto {
    aead: Aead,
    nonce_prefix: [u8; NONCE_SIZE],
    obfuscator: SequenceObfuscator,
}

impl Drop for DirectionCrypto {
    fn drop(&mut self) {
        self.nonce_prefix.zeroize();
    }
}

/// State owned by the send path.
struct SendState {
    crypto: Option<DirectionCrypto>,
    next_seq: u64,
}

/// State owned by the receive path.
struct RecvState {
    crypto: Option<DirectionCrypto>,
    window: ReplayWindow,
}

/// An established transport session.
pub struct Session {
    id: u64,
    role: Role,
    max_record_payload: usize,
    state: Mutex<SessionState>,
    send: Mutex<SendState>,
    recv: Mutex<RecvState>,

    records_sent: AtomicU64,
    bytes_sent: AtomicU64,
    records_received: AtomicU64,
    bytes_received: AtomicU64,
    auth_failures: AtomicU64,
    replays_dropped: AtomicU64,
    malformed_dropped: AtomicU64,
    wrong_session_dropped: AtomicU64,
}

impl Session {
    /// Install a session from freshly derived keys.
    ///
    /// `keys` is consumed; the session is the only holder of the material
    /// from here on.
    pub fn new(id: u64, role: Role, keys: SessionKeys, config: &Config) -> Self {
        let send_crypto = DirectionCrypto {
            aead: Aead::new(&keys.send_key()),
            nonce_prefix: *keys.send_nonce_prefix(),
            obfuscator: SequenceObfuscator::new(*keys.send_seq_key()),
        };
        let recv_crypto = DirectionCrypto {
            aead: Aead::new(&keys.recv_key()),
            nonce_prefix: *keys.recv_nonce_prefix(),
            obfuscator: SequenceObfuscator::new(*keys.recv_seq_key()),
        };

        Self {
            id,
            role,
            max_record_payload: config.max_record_payload,
            state: Mutex::new(SessionState::Established),
            send: Mutex::new(SendState {
                crypto: Some(send_crypto),
                next_seq: INITIAL_SEQ,
            }),
            recv: Mutex::new(RecvState {
                crypto: Some(recv_crypto),
                window: ReplayWindow::new(config.replay_window_bits),
            }),
            records_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            records_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            replays_dropped: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            wrong_session_dropped: AtomicU64::new(0),
        }
    }

    /// Session identifier, echoed in every record.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Which side of the handshake this session is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Seal a cleartext payload into one or more records.
    ///
    /// The payload is split into `Data` frames on stream 0, each sealed
    /// into its own record of at most `max_record_payload` plaintext bytes.
    /// Records are produced in sequence order; the transport may reorder
    /// them downstream.
    pub fn encrypt_data(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.encrypt_stream_data(0, data)
    }

    /// Seal a cleartext payload onto a specific stream.
    pub fn encrypt_stream_data(&self, stream_id: StreamId, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        let chunk_size = self
            .max_record_payload
            .saturating_sub(mux::DATA_FRAME_OVERHEAD)
            .max(1);

        if data.is_empty() {
            let frame = Frame::Data {
                stream_id,
                payload: Vec::new(),
            };
            return Ok(vec![self.encrypt_frames(&[frame])?]);
        }

        let mut records = Vec::with_capacity(data.len().div_ceil(chunk_size));
        for chunk in data.chunks(chunk_size) {
            let frame = Frame::Data {
                stream_id,
                payload: chunk.to_vec(),
            };
            records.push(self.encrypt_frames(&[frame])?);
        }
        Ok(records)
    }

    /// Seal a batch of frames into a single record.
    pub fn encrypt_frames(&self, frames: &[Frame]) -> Result<Vec<u8>> {
        let batch = Frame::encode_batch(frames)?;
        if batch.len() > self.max_record_payload {
            return Err(Error::malformed(format!(
                "frame batch of {} bytes exceeds max record payload {}",
                batch.len(),
                self.max_record_payload
            )));
        }
        self.seal_record(&batch)
    }

    /// Seal a single Keepalive frame; the enclosing tunnel decides cadence.
    pub fn keepalive_record(&self) -> Result<Vec<u8>> {
        self.encrypt_frames(&[Frame::Keepalive])
    }

    fn seal_record(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut send = self.send.lock();
        if send.crypto.is_none() {
            return Err(Error::SessionClosed);
        }

        if send.next_seq >= SEQ_CEILING {
            *self.state.lock() = SessionState::Exhausted;
            return Err(Error::CounterExhausted);
        }
        let seq = send.next_seq;
        send.next_seq += 1;

        let crypto = send.crypto.as_ref().ok_or(Error::SessionClosed)?;
        let header = RecordHeader {
            obf_seq: crypto.obfuscator.obfuscate(seq),
            session_id: self.id,
        };
        let header_bytes = header.encode();
        let nonce = Nonce::from_prefix_and_seq(&crypto.nonce_prefix, seq);
        let ciphertext = crypto.aead.seal(&nonce, plaintext, &header_bytes)?;

        self.records_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(plaintext.len() as u64, Ordering::Relaxed);

        Ok(record::build_record(&header, &ciphertext))
    }

    /// Open one received record and parse its frames.
    ///
    /// Recoverable errors (`MalformedRecord`, `WrongSession`, `Replay`,
    /// `TooOld`, `AeadAuthFail`) mean the record was counted and dropped;
    /// the session is unaffected and the caller should continue receiving.
    pub fn decrypt_record(&self, bytes: &[u8]) -> Result<Vec<Frame>> {
        let result = self.open_record(bytes);
        if let Err(err) = &result {
            self.count_drop(err);
        }
        result
    }

    fn open_record(&self, bytes: &[u8]) -> Result<Vec<Frame>> {
        let (header, ciphertext) = record::parse_record(bytes)?;
        if header.session_id != self.id {
            return Err(Error::WrongSession {
                expected: self.id,
                actual: header.session_id,
            });
        }

        let mut recv = self.recv.lock();
        let RecvState { crypto, window } = &mut *recv;
        let crypto = crypto.as_ref().ok_or(Error::SessionClosed)?;

        let seq = crypto.obfuscator.deobfuscate(header.obf_seq);
        window.probe(seq)?;

        let nonce = Nonce::from_prefix_and_seq(&crypto.nonce_prefix, seq);
        let plaintext = crypto.aead.open(&nonce, ciphertext, &header.encode())?;

        // The record authenticated; only now may the window move.
        window.commit(seq);
        drop(recv);

        self.records_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(plaintext.len() as u64, Ordering::Relaxed);

        Frame::decode_batch(&plaintext)
    }

    fn count_drop(&self, err: &Error) {
        let counter = match err {
            Error::AeadAuthFail => &self.auth_failures,
            Error::Replay(_) | Error::TooOld(_) => &self.replays_dropped,
            Error::MalformedRecord(_) => &self.malformed_dropped,
            Error::WrongSession { .. } => &self.wrong_session_dropped,
            _ => return,
        };
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        // Rate-limited: attackers can make these arbitrarily frequent
        if n == 1 || n % 1024 == 0 {
            tracing::debug!(session = self.id, count = n, "dropped record: {err}");
        }
    }

    /// Shut the session down, wiping key material.
    ///
    /// Idempotent. Every subsequent seal or open fails with
    /// [`Error::SessionClosed`].
    pub fn shutdown(&self) {
        *self.state.lock() = SessionState::Closed;
        // Dropping the direction state zeroizes keys and prefixes
        self.send.lock().crypto.take();
        self.recv.lock().crypto.take();
    }

    /// Snapshot of the session's traffic counters.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            id: self.id,
            state: self.state(),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            records_received: self.records_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            replays_dropped: self.replays_dropped.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            wrong_session_dropped: self.wrong_session_dropped.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn set_send_seq(&self, seq: u64) {
        self.send.lock().next_seq = seq;
    }

    #[cfg(test)]
    fn recv_high_water(&self) -> u64 {
        self.recv.lock().window.high_water()
    }
}

/// Point-in-time view of a session's counters (no sensitive data).
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Session identifier
    pub id: u64,
    /// Lifecycle state at snapshot time
    pub state: SessionState,
    /// Records sealed
    pub records_sent: u64,
    /// Plaintext bytes sealed
    pub bytes_sent: u64,
    /// Records opened successfully
    pub records_received: u64,
    /// Plaintext bytes recovered
    pub bytes_received: u64,
    /// Records dropped for tag verification failure
    pub auth_failures: u64,
    /// Records dropped as replayed or too old
    pub replays_dropped: u64,
    /// Records dropped as malformed
    pub malformed_dropped: u64,
    /// Records dropped for a foreign session id
    pub wrong_session_dropped: u64,
}
