//! Session record wire format.
//!
//! ```text
//! ┌──────────────────┬──────────────────┬─────────────────────────┐
//! │ obf_seq (8, BE)  │ session_id (8)   │ ciphertext + tag (N+16) │
//! └──────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! The header travels in cleartext but is covered by the AEAD as
//! associated data, exactly as it appears on the wire (sequence already
//! obfuscated). There is no length field; the enclosing TLS record
//! supplies one.

use bytes::BufMut;

use crate::crypto::TAG_SIZE;
use crate::error::{Error, Result};

/// Record header size: obfuscated sequence plus session id.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Smallest valid record: header plus an AEAD tag over an empty payload.
pub const MIN_RECORD_SIZE: usize = RECORD_HEADER_SIZE + TAG_SIZE;

/// Parsed cleartext header of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Obfuscated sequence number, as seen on the wire
    pub obf_seq: u64,
    /// Session identifier chosen by the responder
    pub session_id: u64,
}

impl RecordHeader {
    /// Encode the header to its 16 wire bytes.
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        bytes[..8].copy_from_slice(&self.obf_seq.to_be_bytes());
        bytes[8..].copy_from_slice(&self.session_id.to_be_bytes());
        bytes
    }
}

/// Split a record into its header and ciphertext.
///
/// Fails with [`Error::MalformedRecord`] if the record cannot hold a header
/// and an authentication tag.
pub fn parse_record(record: &[u8]) -> Result<(RecordHeader, &[u8])> {
    if record.len() < MIN_RECORD_SIZE {
        return Err(Error::malformed(format!(
            "record of {} bytes, minimum is {}",
            record.len(),
            MIN_RECORD_SIZE
        )));
    }

    let obf_seq = u64::from_be_bytes(record[..8].try_into().unwrap());
    let session_id = u64::from_be_bytes(record[8..16].try_into().unwrap());

    Ok((
        RecordHeader {
            obf_seq,
            session_id,
        },
        &record[RECORD_HEADER_SIZE..],
    ))
}

/// Assemble a record from its header and sealed payload.
pub fn build_record(header: &RecordHeader, ciphertext: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + ciphertext.len());
    record.put_slice(&header.encode());
    record.extend_from_slice(ciphertext);
    record
}
