use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use wsmux_transport::{CloseCode, MessageSink};

use crate::codec::{encode, RAW_STREAM_ID};
use crate::error::Result;
use crate::frame_type::FrameType;

/// Serializes every writer of one connection onto its transport.
///
/// Cloning is cheap; all clones share the same sink and the same write
/// lock, so frames from different streams are never interleaved.
#[derive(Clone)]
pub struct FrameWriter {
    sink: Arc<Mutex<Box<dyn MessageSink>>>,
}

impl FrameWriter {
    /// Wrap the sending half of a connection.
    pub fn new(sink: Box<dyn MessageSink>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Encode and send one frame.
    ///
    /// On [`RAW_STREAM_ID`] the payload is sent as-is for peers that do not
    /// speak the framing protocol.
    pub async fn write_packet(
        &self,
        frame_type: FrameType,
        stream_id: u32,
        payload: &[u8],
    ) -> Result<()> {
        let message = if stream_id == RAW_STREAM_ID {
            Bytes::copy_from_slice(payload)
        } else {
            encode(stream_id, frame_type, payload)?
        };

        let mut sink = self.sink.lock().await;
        sink.send(message).await?;
        trace!(
            stream_id,
            frame_type = frame_type.name(),
            size = payload.len(),
            "wrote frame"
        );
        Ok(())
    }

    /// Close the underlying connection.
    pub async fn close(&self, code: CloseCode) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.close(code).await?;
        debug!(code = code.0, "closed connection writer");
        Ok(())
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").finish_non_exhaustive()
    }
}
