//! # VEIL transport core
//!
//! The cryptographic heart of the VEIL tunnel: an obfuscated, authenticated
//! datagram protocol that carries IP traffic while looking like TLS 1.3
//! application data on the wire.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Payload source/sink (cleartext IP packets, external)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Mux framing (Data / Control / Keepalive / Close)       │
//! ├─────────────────────────────────────────────────────────┤
//! │  Session records (obf seq ‖ session id ‖ AEAD payload)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  TLS camouflage (cosmetic 1.3 application-data framing) │
//! ├─────────────────────────────────────────────────────────┤
//! │  Datagram transport (UDP, external)                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Goals
//!
//! 1. **Authenticated**: every record is ChaCha20-Poly1305 sealed with keys
//!    agreed by a PSK-authenticated X25519 handshake
//! 2. **Unobservable**: headers carry no cleartext sequence numbers and the
//!    byte stream parses as TLS 1.3 application data
//! 3. **Replay-safe**: a sliding bitmap window suppresses duplicates without
//!    imposing ordering
//! 4. **Inert under attack**: garbage records are counted and dropped, never
//!    answered and never able to advance session state

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod error;
pub mod handshake;
pub mod session;
pub mod transport;
pub mod wrapper;

pub use error::{Error, Result};
pub use session::{Session, SessionStats};

/// Protocol version identifier
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Pre-shared key length in bytes
pub const PSK_SIZE: usize = 32;

/// Default maximum plaintext bytes per record (fits typical path MTU after
/// TLS and record overhead)
pub const DEFAULT_MAX_RECORD_PAYLOAD: usize = 1200;

/// Default replay window width in bits
pub const DEFAULT_REPLAY_WINDOW_BITS: usize = 1024;

/// Default overall handshake deadline (milliseconds)
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Default maximum accepted clock skew for handshake timestamps (milliseconds)
pub const DEFAULT_MAX_CLOCK_SKEW_MS: u64 = 60_000;

/// Configuration for the VEIL transport core.
#[derive(Clone)]
pub struct Config {
    /// 32-byte pre-shared key, distributed out-of-band
    pub psk: [u8; PSK_SIZE],
    /// Caller-supplied domain separator mixed into the key schedule; may be
    /// empty
    pub info: Vec<u8>,
    /// Maximum accepted clock skew for handshake timestamps (milliseconds)
    pub max_clock_skew_ms: u64,
    /// Replay window width in bits (multiple of 64, at least 64)
    pub replay_window_bits: usize,
    /// Overall handshake deadline (milliseconds)
    pub handshake_timeout_ms: u64,
    /// Maximum plaintext bytes sealed into one record
    pub max_record_payload: usize,
    /// Accept protocol versions newer than [`PROTOCOL_VERSION`]
    pub allow_prerelease_version: bool,
}

impl Config {
    /// Create a configuration with the given PSK and default limits.
    pub fn new(psk: [u8; PSK_SIZE]) -> Self {
        Self {
            psk,
            info: Vec::new(),
            max_clock_skew_ms: DEFAULT_MAX_CLOCK_SKEW_MS,
            replay_window_bits: DEFAULT_REPLAY_WINDOW_BITS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            max_record_payload: DEFAULT_MAX_RECORD_PAYLOAD,
            allow_prerelease_version: false,
        }
    }

    /// Validate the configuration limits.
    pub fn validate(&self) -> Result<()> {
        if self.replay_window_bits < 64 || self.replay_window_bits % 64 != 0 {
            return Err(Error::config(
                "replay_window_bits must be a positive multiple of 64",
            ));
        }
        if self.max_record_payload == 0 {
            return Err(Error::config("max_record_payload must be non-zero"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(Error::config("handshake_timeout_ms must be non-zero"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // PSK deliberately omitted
        f.debug_struct("Config")
            .field("info_len", &self.info.len())
            .field("max_clock_skew_ms", &self.max_clock_skew_ms)
            .field("replay_window_bits", &self.replay_window_bits)
            .field("handshake_timeout_ms", &self.handshake_timeout_ms)
            .field("max_record_payload", &self.max_record_payload)
            .field("allow_prerelease_version", &self.allow_prerelease_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new([0xAA; PSK_SIZE]);
        assert_eq!(config.max_record_payload, DEFAULT_MAX_RECORD_PAYLOAD);
        assert_eq!(config.replay_window_bits, DEFAULT_REPLAY_WINDOW_BITS);
        assert!(!config.allow_prerelease_version);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::new([0u8; PSK_SIZE]);
        config.replay_window_bits = 100;
        assert!(config.validate().is_err());

        config.replay_window_bits = 0;
        assert!(config.validate().is_err());

        config.replay_window_bits = 64;
        config.max_record_payload = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_debug_hides_psk() {
        let config = Config::new([0x42; PSK_SIZE]);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("psk"));
        assert!(!rendered.contains("66")); // 0x42
    }
}
