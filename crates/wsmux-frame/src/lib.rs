//! Stream framing for wsmux.
//!
//! Every multiplexed message is framed with a fixed 7-byte header:
//! - A 1-byte frame type (INITIAL, DATA, CLOSE)
//! - A 2-byte big-endian payload length
//! - A 4-byte big-endian stream id
//!
//! The [`FrameWriter`] is the single serialization point for all streams
//! sharing one connection; the [`FrameReader`] is its receive-side twin.

pub mod codec;
pub mod error;
pub mod frame_type;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode, encode_frame, extract_payload, Frame, FrameHeader,
    HEADER_SIZE, MAX_PAYLOAD, RAW_STREAM_ID,
};
pub use error::{FrameError, Result};
pub use frame_type::FrameType;
pub use reader::FrameReader;
pub use writer::FrameWriter;
