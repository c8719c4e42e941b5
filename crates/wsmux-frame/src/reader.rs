use bytes::Bytes;
use wsmux_transport::MessageSource;

use crate::codec::{decode_frame, Frame};
use crate::error::{FrameError, Result};

/// Reads complete frames from the receiving half of a connection.
///
/// A connection has exactly one reader; it is owned by the task that
/// demultiplexes the connection.
pub struct FrameReader {
    source: Box<dyn MessageSource>,
}

impl FrameReader {
    /// Wrap the receiving half of a connection.
    pub fn new(source: Box<dyn MessageSource>) -> Self {
        Self { source }
    }

    /// Receive the next raw transport message.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` once the peer has closed.
    pub async fn read_message(&mut self) -> Result<Bytes> {
        match self.source.recv().await? {
            Some(message) => Ok(message),
            None => Err(FrameError::ConnectionClosed),
        }
    }

    /// Receive and decode the next frame.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let message = self.read_message().await?;
        decode_frame(message)
    }

    /// Consume the reader and return the underlying source.
    pub fn into_inner(self) -> Box<dyn MessageSource> {
        self.source
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader").finish_non_exhaustive()
    }
}
