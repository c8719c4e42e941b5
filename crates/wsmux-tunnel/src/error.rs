use wsmux_frame::FrameError;
use wsmux_transport::TransportError;

/// Errors surfaced by tunnels and their streams.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// The peer sent something that does not parse as a frame.
    /// Fatal to the connection it arrived on.
    #[error("protocol error: {0}")]
    Protocol(#[source] FrameError),

    /// The underlying transport failed.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// A payload was too large for one frame. Nothing was sent and the
    /// connection stays up.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream was already closed.
    #[error("stream {0} is closed")]
    StreamClosed(u32),

    /// No live connection to the server.
    #[error("tunnel is closed")]
    TunnelClosed,

    /// Every stream id this client can allocate has been used.
    #[error("stream ids exhausted")]
    StreamIdsExhausted,

    /// Capability negotiation failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// I/O error while binding or accepting.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for TunnelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Transport(err) => TunnelError::Connection(err),
            FrameError::ConnectionClosed => TunnelError::Connection(TransportError::Closed),
            FrameError::PayloadTooLarge { size, max } => TunnelError::PayloadTooLarge { size, max },
            other => TunnelError::Protocol(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
