use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::frame_type::FrameType;

/// Frame header: type (1) + length (2) + stream id (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Stream id reserved for single-stream compatibility mode.
///
/// Messages on this id are sent without a header.
pub const RAW_STREAM_ID: u32 = 0;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw type byte; see [`FrameType`].
    pub frame_type: u8,
    /// Payload length in bytes.
    pub length: u16,
    /// Stream the frame belongs to.
    pub stream_id: u32,
}

/// A decoded frame with stream routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the frame means.
    pub frame_type: FrameType,
    /// The stream this frame belongs to.
    pub stream_id: u32,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, stream_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            stream_id,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────────┬───────────────┬─────────────────┐
/// │ Type     │ Length       │ Stream ID     │ Payload         │
/// │ (1B)     │ (2B BE)      │ (4B BE)       │ (Length bytes)  │
/// └──────────┴──────────────┴───────────────┴─────────────────┘
/// ```
pub fn encode_frame(
    stream_id: u32,
    frame_type: FrameType,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(frame_type.as_u8());
    dst.put_u16(payload.len() as u16);
    dst.put_u32(stream_id);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a frame into a freshly allocated buffer.
pub fn encode(stream_id: u32, frame_type: FrameType, payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(stream_id, frame_type, payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode the 7-byte header at the start of `src`.
///
/// The type byte is returned as-is; callers decide what an unknown type means.
pub fn decode_header(src: &[u8]) -> Result<FrameHeader> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            len: src.len(),
            needed: HEADER_SIZE,
        });
    }

    Ok(FrameHeader {
        frame_type: src[0],
        length: u16::from_be_bytes([src[1], src[2]]),
        stream_id: u32::from_be_bytes([src[3], src[4], src[5], src[6]]),
    })
}

/// Copy `length` payload bytes out of an encoded frame.
pub fn extract_payload(frame: &[u8], length: u16) -> Result<Bytes> {
    let end = HEADER_SIZE + length as usize;
    if frame.len() < end {
        return Err(FrameError::Truncated {
            len: frame.len(),
            needed: end,
        });
    }
    Ok(Bytes::copy_from_slice(&frame[HEADER_SIZE..end]))
}

/// Decode one transport message into a frame.
///
/// The payload is a zero-copy slice of `message`. Bytes past the declared
/// length are ignored.
pub fn decode_frame(message: Bytes) -> Result<Frame> {
    let header = decode_header(&message)?;
    let frame_type = FrameType::try_from(header.frame_type)?;

    let end = HEADER_SIZE + header.length as usize;
    if message.len() < end {
        return Err(FrameError::Truncated {
            len: message.len(),
            needed: end,
        });
    }

    Ok(Frame {
        frame_type,
        stream_id: header.stream_id,
        payload: message.slice(HEADER_SIZE..end),
    })
}
