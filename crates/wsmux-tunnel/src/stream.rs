use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wsmux_frame::{FrameType, FrameWriter, RAW_STREAM_ID};

use crate::error::{Result, TunnelError};
use crate::registry::Registry;

/// One logical, bidirectional channel inside a tunnel.
///
/// Handles are cheap to clone; every clone refers to the same stream. Inbound
/// messages are buffered in a bounded queue; outbound messages go straight
/// to the connection's shared [`FrameWriter`].
#[derive(Clone)]
pub struct Stream {
    inner: Arc<Inner>,
}

struct Inner {
    id: u32,
    writer: FrameWriter,
    state: Mutex<State>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
    dropped: AtomicU64,
    registry: Option<Weak<Registry>>,
}

struct State {
    closed: bool,
    tx: Option<mpsc::Sender<Bytes>>,
}

impl Stream {
    /// Create an open stream whose inbound queue holds `capacity` messages.
    pub fn new(id: u32, writer: FrameWriter, capacity: usize) -> Self {
        Self::build(id, writer, capacity, None)
    }

    /// Create a stream and register it; it removes itself once closed.
    ///
    /// If the registry is already closed the stream comes back closed.
    pub(crate) fn registered(
        id: u32,
        writer: FrameWriter,
        capacity: usize,
        registry: &Arc<Registry>,
    ) -> Self {
        let stream = Self::build(id, writer, capacity, Some(Arc::downgrade(registry)));
        registry.set(id, stream.clone());
        stream
    }

    fn build(
        id: u32,
        writer: FrameWriter,
        capacity: usize,
        registry: Option<Weak<Registry>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                id,
                writer,
                state: Mutex::new(State {
                    closed: false,
                    tx: Some(tx),
                }),
                inbound: tokio::sync::Mutex::new(rx),
                dropped: AtomicU64::new(0),
                registry,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Messages discarded because the inbound queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Wait for the next inbound message.
    ///
    /// Returns `None` once the stream is closed and every buffered message
    /// has been read.
    pub async fn read(&self) -> Option<Bytes> {
        let mut rx = self.inner.inbound.lock().await;
        rx.recv().await
    }

    /// Send one message to the peer as a DATA frame.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TunnelError::StreamClosed(self.inner.id));
        }
        self.inner
            .writer
            .write_packet(FrameType::Data, self.inner.id, data)
            .await?;
        Ok(())
    }

    /// Tell the peer the stream is done, then close it locally.
    ///
    /// The CLOSE frame is best effort; the local side is closed whether or
    /// not it could be sent.
    pub async fn close(&self) {
        if self.inner.id != RAW_STREAM_ID && !self.is_closed() {
            if let Err(err) = self
                .inner
                .writer
                .write_packet(FrameType::Close, self.inner.id, &[])
                .await
            {
                debug!(stream_id = self.inner.id, error = %err, "close frame not sent");
            }
        }
        self.kill();
    }

    /// Close the stream locally without notifying the peer.
    ///
    /// Pending and later reads drain what is buffered and then end.
    pub fn kill(&self) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.tx = None;
        }
        if let Some(registry) = self.inner.registry.as_ref().and_then(Weak::upgrade) {
            registry.remove_stream(self);
        }
        debug!(stream_id = self.inner.id, "stream closed");
    }

    /// Enqueue an inbound message without waiting.
    ///
    /// Returns `false` if the message was not queued, either because the
    /// stream is closed or because its queue is full.
    pub(crate) fn push(&self, payload: Bytes) -> bool {
        let state = self.state();
        let Some(tx) = state.tx.as_ref() else {
            return false;
        };
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(payload)) => {
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    stream_id = self.inner.id,
                    size = payload.len(),
                    dropped,
                    "inbound queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueue an inbound message, waiting for queue space.
    pub(crate) async fn deliver(&self, payload: Bytes) -> bool {
        let tx = {
            let state = self.state();
            match state.tx.as_ref() {
                Some(tx) => tx.clone(),
                None => return false,
            }
        };
        tx.send(payload).await.is_ok()
    }

    /// True if both handles refer to the same stream.
    pub(crate) fn same_as(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped())
            .finish()
    }
}
