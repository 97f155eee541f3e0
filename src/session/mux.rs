//! Multiplexed framing inside the decrypted record payload.
//!
//! Each frame is `kind(1) + len(2) + body`; several frames may share one
//! record. The body layout depends on the kind:
//!
//! * `Data`: `stream_id(4) + payload`
//! * `Control`: opaque bytes, interpreted by the enclosing tunnel
//! * `Keepalive`: empty
//! * `Close`: `stream_id(4)`

use bytes::BufMut;

use crate::error::{Error, Result};

/// Stream identifier type.
pub type StreamId = u32;

/// Frame header size: kind byte plus 16-bit length.
pub const FRAME_HEADER_SIZE: usize = 3;

/// Size of the stream id carried by Data and Close bodies.
const STREAM_ID_SIZE: usize = 4;

/// Largest frame body the 16-bit length prefix can describe.
pub const MAX_FRAME_BODY: usize = u16::MAX as usize;

/// Wire overhead of a Data frame: header plus stream id.
pub const DATA_FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + STREAM_ID_SIZE;

/// Frame kinds. Wire constants, stable across versions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Payload bytes for a stream.
    Data = 0x01,
    /// Tunnel-level control message, opaque to the session.
    Control = 0x02,
    /// Idle keepalive, no body.
    Keepalive = 0x03,
    /// Graceful close of a stream.
    Close = 0x04,
}

impl FrameKind {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(Self::Data),
            0x02 => Ok(Self::Control),
            0x03 => Ok(Self::Keepalive),
            0x04 => Ok(Self::Close),
            other => Err(Error::malformed(format!(
                "unknown frame kind: {:#04x}",
                other
            ))),
        }
    }
}

/// A multiplexing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload bytes for a stream.
    Data {
        /// Stream the payload belongs to
        stream_id: StreamId,
        /// Cleartext bytes
        payload: Vec<u8>,
    },
    /// Tunnel-level control message.
    Control(Vec<u8>),
    /// Idle keepalive.
    Keepalive,
    /// Graceful close of a stream.
    Close {
        /// Stream being closed
        stream_id: StreamId,
    },
}

impl Frame {
    /// The frame's wire kind.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Data { .. } => FrameKind::Data,
            Frame::Control(_) => FrameKind::Control,
            Frame::Keepalive => FrameKind::Keepalive,
            Frame::Close { .. } => FrameKind::Close,
        }
    }

    /// Body length in bytes.
    fn body_len(&self) -> usize {
        match self {
            Frame::Data { payload, .. } => STREAM_ID_SIZE + payload.len(),
            Frame::Control(body) => body.len(),
            Frame::Keepalive => 0,
            Frame::Close { .. } => STREAM_ID_SIZE,
        }
    }

    /// Total encoded size, header included.
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.body_len()
    }

    /// Append the encoded frame to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let body_len = self.body_len();
        if body_len > MAX_FRAME_BODY {
            return Err(Error::malformed(format!(
                "frame body {} exceeds length prefix",
                body_len
            )));
        }

        out.put_u8(self.kind() as u8);
        out.put_u16(body_len as u16);
        match self {
            Frame::Data { stream_id, payload } => {
                out.put_u32(*stream_id);
                out.extend_from_slice(payload);
            }
            Frame::Control(body) => out.extend_from_slice(body),
            Frame::Keepalive => {}
            Frame::Close { stream_id } => out.put_u32(*stream_id),
        }
        Ok(())
    }

    /// Encode a batch of frames into one contiguous buffer.
    pub fn encode_batch(frames: &[Frame]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(frames.iter().map(Frame::wire_size).sum());
        for frame in frames {
            frame.encode_into(&mut out)?;
        }
        Ok(out)
    }

    /// Decode all frames from a decrypted record payload.
    ///
    /// Rejects trailing garbage, truncated frames, and unknown kinds; a
    /// record either parses completely or not at all.
    pub fn decode_batch(data: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            if data.len() - offset < FRAME_HEADER_SIZE {
                return Err(Error::malformed(format!(
                    "trailing {} bytes too short for a frame header",
                    data.len() - offset
                )));
            }

            let kind = FrameKind::from_u8(data[offset])?;
            let body_len = u16::from_be_bytes([data[offset + 1], data[offset + 2]]) as usize;
            offset += FRAME_HEADER_SIZE;

            if data.len() - offset < body_len {
                return Err(Error::malformed(format!(
                    "frame body truncated: header says {} bytes, got {}",
                    body_len,
                    data.len() - offset
                )));
            }
            let body = &data[offset..offset + body_len];
            offset += body_len;

            frames.push(Self::decode_body(kind, body)?);
        }

        Ok(frames)
    }

    fn decode_body(kind: FrameKind, body: &[u8]) -> Result<Frame> {
        match kind {
            FrameKind::Data => {
                if body.len() < STREAM_ID_SIZE {
                    return Err(Error::malformed("Data frame missing stream id"));
                }
                let stream_id =
                    u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                Ok(Frame::Data {
                    stream_id,
                    payload: body[STREAM_ID_SIZE..].to_vec(),
                })
            }
            FrameKind::Control => Ok(Frame::Control(body.to_vec())),
            FrameKind::Keepalive => {
                if !body.is_empty() {
                    return Err(Error::malformed("Keepalive frame carries a body"));
                }
                Ok(Frame::Keepalive)
            }
            FrameKind::Close => {
                if body.len() != STREAM_ID_SIZE {
                    return Err(Error::malformed("Close frame body must be a stream id"));
                }
                let stream_id =
                    u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                Ok(Frame::Close { stream_id })
            }
        }
    }
}
