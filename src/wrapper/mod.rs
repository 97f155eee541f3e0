//! TLS record camouflage.
//!
//! Wraps session records in TLS 1.3 application-data framing so the byte
//! stream parses as legitimate TLS to DPI middleboxes. This is a cosmetic
//! wrapper only: it performs no TLS handshake and no encryption. The
//! payload is already sealed by the record layer underneath.
//!
//! Record format (RFC 8446 section 5.1):
//!
//! ```text
//! +--------+--------+--------+--------+--------+
//! | Type   | Legacy version  | Length          |
//! | (0x17) | (0x03) | (0x03) | (MSB)  | (LSB)  |
//! +--------+--------+--------+--------+--------+
//! |                Payload data ...            |
//! +--------------------------------------------+
//! ```
//!
//! Overhead: 5 bytes per record. Payloads longer than 16384 bytes are split
//! across multiple concatenated records.

use bytes::BufMut;

use crate::error::{Error, Result};

/// TLS content types (RFC 8446 section 5.1).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    /// change_cipher_spec
    ChangeCipherSpec = 0x14,
    /// alert
    Alert = 0x15,
    /// handshake
    Handshake = 0x16,
    /// application_data, the only type this wrapper emits
    ApplicationData = 0x17,
}

impl ContentType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x14 => Ok(Self::ChangeCipherSpec),
            0x15 => Ok(Self::Alert),
            0x16 => Ok(Self::Handshake),
            0x17 => Ok(Self::ApplicationData),
            other => Err(Error::malformed(format!(
                "unknown TLS content type: {:#04x}",
                other
            ))),
        }
    }
}

/// TLS record header size in bytes.
pub const TLS_HEADER_SIZE: usize = 5;

/// Maximum TLS record payload length (RFC 8446 section 5.1).
pub const MAX_TLS_PAYLOAD: usize = 16384;

/// legacy_record_version; TLS 1.3 pins this to 0x0303 for compatibility.
const LEGACY_VERSION: u16 = 0x0303;

/// Wrap a byte vector in TLS application-data records.
///
/// Payloads over [`MAX_TLS_PAYLOAD`] are split into multiple concatenated
/// records. Empty input still produces one (empty) record so every send
/// shows up as TLS traffic.
pub fn wrap(data: &[u8]) -> Vec<u8> {
    let num_records = if data.is_empty() {
        1
    } else {
        data.len().div_ceil(MAX_TLS_PAYLOAD)
    };
    let mut out = Vec::with_capacity(num_records * TLS_HEADER_SIZE + data.len());

    let mut offset = 0;
    loop {
        let chunk = MAX_TLS_PAYLOAD.min(data.len() - offset);

        out.put_u8(ContentType::ApplicationData as u8);
        out.put_u16(LEGACY_VERSION);
        out.put_u16(chunk as u16);
        out.extend_from_slice(&data[offset..offset + chunk]);

        offset += chunk;
        if offset >= data.len() {
            break;
        }
    }

    out
}

/// Unwrap a single TLS record at the start of `data`.
///
/// Returns the payload slice and the total bytes consumed (header +
/// payload).
///
/// # Errors
///
/// * [`Error::Incomplete`] - short header or truncated payload
/// * [`Error::MalformedRecord`] - unknown content type, or length above
///   [`MAX_TLS_PAYLOAD`]
/// * [`Error::NotApplicationData`] - valid record of another content type
pub fn unwrap_one(data: &[u8]) -> Result<(&[u8], usize)> {
    if data.len() < TLS_HEADER_SIZE {
        return Err(Error::Incomplete {
            needed: TLS_HEADER_SIZE,
            available: data.len(),
        });
    }

    let content_type = ContentType::from_u8(data[0])?;
    let length = u16::from_be_bytes([data[3], data[4]]) as usize;

    if length > MAX_TLS_PAYLOAD {
        return Err(Error::malformed(format!(
            "TLS record length {} exceeds maximum",
            length
        )));
    }

    if content_type != ContentType::ApplicationData {
        return Err(Error::NotApplicationData(content_type as u8));
    }

    let total = TLS_HEADER_SIZE + length;
    if data.len() < total {
        return Err(Error::Incomplete {
            needed: total,
            available: data.len(),
        });
    }

    Ok((&data[TLS_HEADER_SIZE..total], total))
}

/// Unwrap all concatenated TLS records, concatenating their payloads.
///
/// Fails fast on the first invalid or non-application-data record.
pub fn unwrap_all(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut offset = 0;

    while offset < data.len() {
        let (payload, consumed) = unwrap_one(&data[offset..])?;
        out.extend_from_slice(payload);
        offset += consumed;
    }

    Ok(out)
}
