use wsmux_transport::TransportError;

/// Errors that can occur during frame encoding/decoding and transmission.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than the header (or the declared payload) requires.
    #[error("truncated frame ({len} bytes, need {needed})")]
    Truncated { len: usize, needed: usize },

    /// The payload exceeds what the 16-bit length field can describe.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The header carries a frame type this protocol does not define.
    #[error("unknown frame type {0:#04x}")]
    UnknownType(u8),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport failed while sending or receiving.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// True for failures of the connection itself rather than of one frame.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed | FrameError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
