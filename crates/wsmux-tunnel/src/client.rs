use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wsmux_frame::{FrameReader, FrameType, FrameWriter};
use wsmux_transport::{CloseCode, Dialer, WebSocket};

use crate::config::TunnelConfig;
use crate::demux::{route_close, route_data};
use crate::error::{Result, TunnelError};
use crate::handshake::client_headers;
use crate::registry::Registry;
use crate::stream::Stream;

/// Multiplexing client for one server address.
///
/// Cloning is cheap; clones share the connection, the stream id counter
/// and the registry of open streams.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    address: String,
    config: TunnelConfig,
    dialer: Box<dyn Dialer>,
    next_id: AtomicU32,
    session: Mutex<Option<Arc<Session>>>,
    connected: Notify,
    start_lock: tokio::sync::Mutex<()>,
}

/// State of one physical connection.
struct Session {
    writer: FrameWriter,
    registry: Arc<Registry>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl Session {
    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn teardown(&self, code: CloseCode) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.registry.kill_all();
        if let Err(err) = self.writer.close(code).await {
            debug!(error = %err, "transport close failed");
        }
    }
}

impl Client {
    /// Client for `address` using WebSocket and default settings.
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_config(address, TunnelConfig::default())
    }

    pub fn with_config(address: impl Into<String>, config: TunnelConfig) -> Self {
        Self::with_dialer(address, config, WebSocket)
    }

    /// Client that opens connections through `dialer`.
    pub fn with_dialer(
        address: impl Into<String>,
        config: TunnelConfig,
        dialer: impl Dialer + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                address: address.into(),
                config,
                dialer: Box::new(dialer),
                next_id: AtomicU32::new(1),
                session: Mutex::new(None),
                connected: Notify::new(),
                start_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn server_address(&self) -> &str {
        &self.inner.address
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.inner.config
    }

    /// True while a connection is up.
    pub fn is_connected(&self) -> bool {
        self.live_session().is_some()
    }

    /// Number of streams open on the current connection.
    pub fn active_streams(&self) -> usize {
        self.live_session()
            .map(|session| session.registry.len())
            .unwrap_or(0)
    }

    /// Connect to the server and start reading frames.
    ///
    /// Returns once the connection is ready for `dial_stream`. Does nothing
    /// if a connection is already up.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.inner.start_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let headers = client_headers(&self.inner.config.mux_version);
        let conn = self
            .inner
            .dialer
            .dial(&self.inner.address, &headers)
            .await?;
        info!(address = %self.inner.address, peer = conn.peer(), "tunnel connected");

        let (sink, source) = conn.into_split();
        let session = Arc::new(Session {
            writer: FrameWriter::new(sink),
            registry: Arc::new(Registry::new()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        *self.session_slot() = Some(Arc::clone(&session));
        tokio::spawn(read_loop(session, FrameReader::new(source)));
        self.inner.connected.notify_waiters();
        Ok(())
    }

    /// Close the connection and every stream on it.
    pub async fn stop(&self) {
        let session = self.session_slot().take();
        if let Some(session) = session {
            session.teardown(CloseCode::NORMAL).await;
            info!(address = %self.inner.address, "tunnel stopped");
        }
    }

    /// Connect, then keep reconnecting whenever the connection drops.
    ///
    /// Health is checked every `health_poll_interval`; failed attempts are
    /// retried after `reconnect_delay`.
    pub async fn start_forever(&self) -> Result<Supervisor> {
        self.start().await?;

        let cancel = CancellationToken::new();
        let client = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { client.supervise(token).await });

        Ok(Supervisor { cancel, task })
    }

    async fn supervise(&self, cancel: CancellationToken) {
        let poll = self.inner.config.health_poll_interval;
        let delay = self.inner.config.reconnect_delay;

        loop {
            tokio::time::sleep(poll).await;
            if cancel.is_cancelled() {
                break;
            }
            if self.is_connected() {
                continue;
            }

            warn!(address = %self.inner.address, "tunnel down, reconnecting");
            match self.start().await {
                Ok(()) => info!(address = %self.inner.address, "tunnel reconnected"),
                Err(err) => {
                    warn!(address = %self.inner.address, error = %err, "reconnect failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.stop().await;
        debug!(address = %self.inner.address, "supervisor finished");
    }

    /// Open a new stream on the current connection.
    ///
    /// Waits up to `dial_ready_timeout` for a connection, which covers the
    /// window while the supervisor is reconnecting.
    pub async fn dial_stream(&self) -> Result<Stream> {
        let id = self.next_stream_id()?;
        let session = self.wait_ready().await?;

        let stream = Stream::registered(
            id,
            session.writer.clone(),
            self.inner.config.queue_capacity,
            &session.registry,
        );
        // A teardown that ran after `wait_ready` has closed the registry.
        if stream.is_closed() {
            return Err(TunnelError::TunnelClosed);
        }

        if let Err(err) = session
            .writer
            .write_packet(FrameType::Initial, id, &[])
            .await
        {
            stream.kill();
            return Err(err.into());
        }
        if stream.is_closed() || !session.is_live() {
            stream.kill();
            return Err(TunnelError::TunnelClosed);
        }

        debug!(stream_id = id, "stream opened");
        Ok(stream)
    }

    fn next_stream_id(&self) -> Result<u32> {
        self.inner
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| id.checked_add(1))
            .map_err(|_| TunnelError::StreamIdsExhausted)
    }

    async fn wait_ready(&self) -> Result<Arc<Session>> {
        let deadline = Instant::now() + self.inner.config.dial_ready_timeout;
        loop {
            let notified = self.inner.connected.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(session) = self.live_session() {
                return Ok(session);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(TunnelError::TunnelClosed);
            }
        }
    }

    fn live_session(&self) -> Option<Arc<Session>> {
        self.session_slot()
            .as_ref()
            .filter(|session| session.is_live())
            .cloned()
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn set_next_stream_id(&self, id: u32) {
        self.inner.next_id.store(id, Ordering::Release);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.inner.address)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Handle to a reconnect supervisor started by [`Client::start_forever`].
#[derive(Debug)]
pub struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Supervisor {
    /// Ask the supervisor to stop.
    ///
    /// Observed at the next health poll, after which the current connection
    /// is torn down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the supervisor task to finish.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(error = %err, "supervisor task failed");
        }
    }

    /// Cancel and wait.
    pub async fn shutdown(self) {
        self.cancel();
        self.join().await;
    }
}

async fn read_loop(session: Arc<Session>, mut reader: FrameReader) {
    let code = loop {
        let frame = tokio::select! {
            _ = session.cancel.cancelled() => break CloseCode::NORMAL,
            frame = reader.read_frame() => frame,
        };

        match frame {
            Ok(frame) => match frame.frame_type {
                FrameType::Data => route_data(&session.registry, frame.stream_id, frame.payload),
                FrameType::Close => route_close(&session.registry, frame.stream_id),
                FrameType::Initial => {
                    warn!(stream_id = frame.stream_id, "server tried to open a stream");
                    break CloseCode::PROTOCOL_ERROR;
                }
            },
            Err(err) if err.is_connection_error() => {
                debug!(error = %err, "tunnel connection ended");
                break CloseCode::NORMAL;
            }
            Err(err) => {
                warn!(error = %err, "malformed frame from server");
                break CloseCode::PROTOCOL_ERROR;
            }
        }
    };

    session.teardown(code).await;
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use bytes::Bytes;
    use wsmux_frame::encode;
    use wsmux_transport::memory::{self, MemoryListener};
    use wsmux_transport::{MessageConn, UpgradeRequest};

    use super::*;

    fn fast_config() -> TunnelConfig {
        TunnelConfig::default()
            .with_dial_ready_timeout(Duration::from_millis(200))
            .with_health_poll_interval(Duration::from_millis(20))
            .with_reconnect_delay(Duration::from_millis(20))
    }

    async fn connected() -> (Client, MessageConn, UpgradeRequest, MemoryListener) {
        let (dialer, mut listener) = memory::listener();
        let client = Client::with_dialer("memory://local/echo", fast_config(), dialer);
        client.start().await.unwrap();
        let (server, request) = listener.accept().await.unwrap();
        (client, server, request, listener)
    }

    #[tokio::test]
    async fn start_sends_capability_header() {
        let (client, _server, request, _listener) = connected().await;
        assert!(client.is_connected());
        assert_eq!(request.path, "/echo");
        assert_eq!(request.header("websocket-mux"), Some("1.0"));
    }

    #[tokio::test]
    async fn dial_before_start_is_tunnel_closed() {
        let (dialer, _listener) = memory::listener();
        let client = Client::with_dialer("memory://local/", fast_config(), dialer);
        let err = client.dial_stream().await.unwrap_err();
        assert!(matches!(err, TunnelError::TunnelClosed));
    }

    #[tokio::test]
    async fn start_fails_without_server() {
        let (dialer, listener) = memory::listener();
        drop(listener);
        let client = Client::with_dialer("memory://local/", fast_config(), dialer);
        let err = client.start().await.unwrap_err();
        assert!(matches!(err, TunnelError::Connection(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn dial_sends_initial_and_routes_data() {
        let (client, server, _request, _listener) = connected().await;
        let (mut server_sink, server_source) = server.into_split();
        let mut reader = FrameReader::new(server_source);

        let stream = client.dial_stream().await.unwrap();
        assert_eq!(stream.id(), 1);
        assert_eq!(client.active_streams(), 1);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Initial);
        assert_eq!(frame.stream_id, 1);

        server_sink
            .send(encode(1, FrameType::Data, b"hi").unwrap())
            .await
            .unwrap();
        assert_eq!(stream.read().await.unwrap().as_ref(), b"hi");

        server_sink
            .send(encode(1, FrameType::Close, &[]).unwrap())
            .await
            .unwrap();
        assert!(stream.read().await.is_none());
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn ids_are_unique_and_increasing() {
        let (client, _server, _request, _listener) = connected().await;

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move { client.dial_stream().await.unwrap().id() }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }

        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 32);
        assert!(!ids.contains(&0));

        let next = client.dial_stream().await.unwrap().id();
        assert!(ids.iter().all(|id| *id < next));
    }

    #[tokio::test]
    async fn id_exhaustion_is_an_error() {
        let (client, _server, _request, _listener) = connected().await;
        client.set_next_stream_id(u32::MAX);
        let err = client.dial_stream().await.unwrap_err();
        assert!(matches!(err, TunnelError::StreamIdsExhausted));
    }

    #[tokio::test]
    async fn server_disconnect_kills_every_stream() {
        let (client, server, _request, _listener) = connected().await;
        let streams = vec![
            client.dial_stream().await.unwrap(),
            client.dial_stream().await.unwrap(),
            client.dial_stream().await.unwrap(),
        ];

        drop(server);
        for stream in &streams {
            let end = tokio::time::timeout(Duration::from_secs(1), stream.read())
                .await
                .expect("read should end after disconnect");
            assert!(end.is_none());
            assert!(stream.is_closed());
        }
        assert!(!client.is_connected());
        assert_eq!(client.active_streams(), 0);
    }

    #[tokio::test]
    async fn malformed_frame_tears_down() {
        let (client, mut server, _request, _listener) = connected().await;
        let stream = client.dial_stream().await.unwrap();

        server.send(Bytes::from_static(b"\x02\x00")).await.unwrap();
        assert!(stream.read().await.is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn initial_from_server_tears_down() {
        let (client, mut server, _request, _listener) = connected().await;
        let stream = client.dial_stream().await.unwrap();

        server
            .send(encode(99, FrameType::Initial, &[]).unwrap())
            .await
            .unwrap();
        assert!(stream.read().await.is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn dial_during_teardown_is_tunnel_closed() {
        let (client, mut server, _request, _listener) = connected().await;
        let session = client.live_session().unwrap();
        session.registry.kill_all();

        let err = client.dial_stream().await.unwrap_err();
        assert!(matches!(err, TunnelError::TunnelClosed));
        assert!(session.registry.is_empty());

        let nothing = tokio::time::timeout(Duration::from_millis(50), server.recv()).await;
        assert!(nothing.is_err(), "no INITIAL expected after teardown");
    }

    #[tokio::test]
    async fn stop_closes_streams_and_transport() {
        let (client, mut server, _request, _listener) = connected().await;
        let stream = client.dial_stream().await.unwrap();
        let _initial = server.recv().await.unwrap();

        client.stop().await;
        assert!(stream.is_closed());
        assert!(!client.is_connected());
        assert!(server.recv().await.unwrap().is_none());

        let err = client.dial_stream().await.unwrap_err();
        assert!(matches!(err, TunnelError::TunnelClosed));
    }

    #[tokio::test]
    async fn start_is_idempotent_while_connected() {
        let (client, _server, _request, mut listener) = connected().await;
        client.start().await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), listener.accept()).await;
        assert!(second.is_err(), "no second connection expected");
    }

    #[tokio::test]
    async fn supervisor_reconnects() {
        let (dialer, mut listener) = memory::listener();
        let client = Client::with_dialer("memory://local/", fast_config(), dialer);
        let supervisor = client.start_forever().await.unwrap();

        let (first, _) = listener.accept().await.unwrap();
        drop(first);

        let (_second, _) = tokio::time::timeout(Duration::from_secs(2), listener.accept())
            .await
            .expect("supervisor should reconnect")
            .unwrap();

        let stream = client.dial_stream().await.unwrap();
        assert!(stream.id() >= 1);

        supervisor.shutdown().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn dial_waits_for_reconnect() {
        let (dialer, mut listener) = memory::listener();
        let config = fast_config().with_dial_ready_timeout(Duration::from_secs(2));
        let client = Client::with_dialer("memory://local/", config, dialer);

        let dialing = {
            let client = client.clone();
            tokio::spawn(async move { client.dial_stream().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.start().await.unwrap();
        let _server = listener.accept().await.unwrap();

        let stream = dialing.await.unwrap().unwrap();
        assert_eq!(stream.id(), 1);
    }
}
