//! Error types for the VEIL transport core.

use thiserror::Error;

/// Result type alias for VEIL operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the VEIL transport core.
///
/// Per-record failures (`MalformedRecord`, `WrongSession`, `Replay`,
/// `TooOld`, `AeadAuthFail`, `NotApplicationData`) are drop-and-continue:
/// the receive loop counts them and moves on. Session-lifetime failures
/// (`CounterExhausted`, `SessionClosed`) and handshake failures propagate
/// to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Record too short or framing invalid
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Record carries a session id this session does not own
    #[error("record for session {actual:#018x}, expected {expected:#018x}")]
    WrongSession { expected: u64, actual: u64 },

    /// Sequence number already accepted within the replay window
    #[error("replayed sequence {0}")]
    Replay(u64),

    /// Sequence number below the replay window horizon
    #[error("sequence {0} below replay window")]
    TooOld(u64),

    /// AEAD tag verification failed
    #[error("authentication failed")]
    AeadAuthFail,

    /// TLS wrapper: record is not application data
    #[error("TLS record content type {0:#04x} is not application data")]
    NotApplicationData(u8),

    /// TLS wrapper: truncated record
    #[error("incomplete TLS record: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    /// No RESPONSE arrived within the handshake deadline
    #[error("handshake timeout after {0}ms")]
    HandshakeTimeout(u64),

    /// Handshake message failed validation
    #[error("handshake rejected: {0}")]
    HandshakeReject(&'static str),

    /// send_seq reached its ceiling; the session must be replaced
    #[error("send sequence counter exhausted")]
    CounterExhausted,

    /// Operation on a session that was shut down
    #[error("session closed")]
    SessionClosed,

    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Network I/O error from the datagram transport
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new malformed-record error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedRecord(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Per-record failure the receive loop should count and drop.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedRecord(_)
                | Error::WrongSession { .. }
                | Error::Replay(_)
                | Error::TooOld(_)
                | Error::AeadAuthFail
                | Error::NotApplicationData(_)
                | Error::Incomplete { .. }
        )
    }

    /// Failure that ends the session for good.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CounterExhausted | Error::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AeadAuthFail;
        assert_eq!(err.to_string(), "authentication failed");

        let err = Error::HandshakeTimeout(30000);
        assert_eq!(err.to_string(), "handshake timeout after 30000ms");

        let err = Error::Replay(42);
        assert_eq!(err.to_string(), "replayed sequence 42");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Replay(1).is_recoverable());
        assert!(Error::TooOld(1).is_recoverable());
        assert!(Error::AeadAuthFail.is_recoverable());
        assert!(!Error::CounterExhausted.is_recoverable());
        assert!(Error::CounterExhausted.is_fatal());
        assert!(Error::SessionClosed.is_fatal());
        assert!(!Error::HandshakeTimeout(1).is_fatal());
    }
}
