use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use wsmux_frame::{FrameReader, FrameType, FrameWriter, RAW_STREAM_ID};
use wsmux_transport::{ws, CloseCode, MessageConn, TransportError, UpgradeRequest};

use crate::config::TunnelConfig;
use crate::demux::{route_close, route_data};
use crate::error::Result;
use crate::handshake::{negotiate, Negotiated};
use crate::registry::Registry;
use crate::router::{handler, Handler, Router};
use crate::stream::Stream;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Multiplexing server.
///
/// Each accepted connection gets its own stream registry; every stream the
/// peer opens is handed to the handler registered for the request path.
#[derive(Debug, Default)]
pub struct Server {
    router: Router,
    config: TunnelConfig,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TunnelConfig) -> Self {
        Self {
            router: Router::new(),
            config,
        }
    }

    /// Register an async handler for streams opened on `pattern`.
    ///
    /// A pattern ending in `/` also serves every path beneath it.
    pub fn handle<F, Fut>(&mut self, pattern: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Stream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.router.insert(pattern, handler(f));
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Bind `address` and serve until the process ends.
    pub async fn listen_and_serve(self, address: &str) -> Result<()> {
        let listener = bind(address).await?;
        self.serve(listener).await
    }

    /// Bind `address` and serve WebSocket over TLS.
    #[cfg(feature = "tls")]
    pub async fn listen_and_serve_tls(
        self,
        address: &str,
        cert_file: impl AsRef<std::path::Path>,
        key_file: impl AsRef<std::path::Path>,
    ) -> Result<()> {
        let acceptor = wsmux_transport::tls::acceptor(cert_file, key_file)?;
        let listener = bind(address).await?;
        self.serve_tls_with_shutdown(listener, acceptor, CancellationToken::new())
            .await
    }

    /// Serve connections from `listener` forever.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, CancellationToken::new())
            .await
    }

    /// Serve connections from `listener` until `shutdown` is cancelled.
    ///
    /// On shutdown every open connection is torn down before returning.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let server = Arc::new(self);
        let tracker = TaskTracker::new();
        log_listening(&listener, &server.router);

        let listener = &listener;
        while let Some((socket, addr)) =
            next_connection(&shutdown, move || listener.accept()).await
        {
            let server = Arc::clone(&server);
            let token = shutdown.child_token();
            tracker.spawn(async move {
                server.upgrade_and_serve(socket, addr.to_string(), token).await;
            });
        }

        tracker.close();
        tracker.wait().await;
        info!("server stopped");
        Ok(())
    }

    /// Serve WebSocket over TLS until `shutdown` is cancelled.
    #[cfg(feature = "tls")]
    pub async fn serve_tls_with_shutdown(
        self,
        listener: TcpListener,
        acceptor: wsmux_transport::tls::TlsAcceptor,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let server = Arc::new(self);
        let tracker = TaskTracker::new();
        log_listening(&listener, &server.router);

        let listener = &listener;
        while let Some((socket, addr)) =
            next_connection(&shutdown, move || listener.accept()).await
        {
            let server = Arc::clone(&server);
            let acceptor = acceptor.clone();
            let token = shutdown.child_token();
            tracker.spawn(async move {
                let peer = addr.to_string();
                match acceptor.accept(socket).await {
                    Ok(tls) => server.upgrade_and_serve(tls, peer, token).await,
                    Err(err) => debug!(%peer, error = %err, "tls handshake failed"),
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        info!("server stopped");
        Ok(())
    }

    /// Drive one already-upgraded connection until it ends.
    pub async fn serve_connection(&self, conn: MessageConn, request: UpgradeRequest) {
        self.run_connection(conn, request, CancellationToken::new())
            .await;
    }

    async fn upgrade_and_serve<S>(&self, io: S, peer: String, shutdown: CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let router = &self.router;
        let upgraded = tokio::select! {
            _ = shutdown.cancelled() => return,
            upgraded = ws::accept(io, peer.clone(), |request| router.lookup(&request.path).is_some()) => upgraded,
        };
        match upgraded {
            Ok((conn, request)) => self.run_connection(conn, request, shutdown).await,
            Err(err) => debug!(%peer, error = %err, "upgrade failed"),
        }
    }

    async fn run_connection(
        &self,
        conn: MessageConn,
        request: UpgradeRequest,
        cancel: CancellationToken,
    ) {
        let peer = request.peer.clone();
        let path = request.path.clone();
        let (sink, source) = conn.into_split();
        let writer = FrameWriter::new(sink);

        let Some(handler) = self.router.lookup(&path) else {
            warn!(%peer, %path, "no handler for path");
            close_writer(&writer, CloseCode::POLICY_VIOLATION).await;
            return;
        };

        let mode = match negotiate(&request, &self.config.mux_version) {
            Ok(mode) => mode,
            Err(err) => {
                warn!(%peer, %path, error = %err, "refusing connection");
                close_writer(&writer, CloseCode::POLICY_VIOLATION).await;
                return;
            }
        };
        info!(%peer, %path, multiplexed = mode.is_multiplexed(), "connection opened");

        let mut connection = Connection {
            reader: FrameReader::new(source),
            writer,
            registry: Arc::new(Registry::new()),
            tracker: TaskTracker::new(),
            cancel,
            handler,
            queue_capacity: self.config.queue_capacity,
        };
        let code = match mode {
            Negotiated::Multiplexed { .. } => connection.run_multiplexed().await,
            Negotiated::Compatibility => connection.run_compatibility().await,
        };
        connection.teardown(code).await;
        info!(%peer, %path, "connection closed");
    }
}

/// Per-connection state of the server read loop.
struct Connection {
    reader: FrameReader,
    writer: FrameWriter,
    registry: Arc<Registry>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    handler: Handler,
    queue_capacity: usize,
}

impl Connection {
    async fn run_multiplexed(&mut self) -> CloseCode {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return CloseCode::GOING_AWAY,
                frame = self.reader.read_frame() => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(err) if err.is_connection_error() => {
                    debug!(error = %err, "peer connection ended");
                    return CloseCode::NORMAL;
                }
                Err(err) => {
                    warn!(error = %err, "malformed frame from peer");
                    return CloseCode::PROTOCOL_ERROR;
                }
            };

            match frame.frame_type {
                FrameType::Initial => self.open_stream(frame.stream_id),
                FrameType::Data => route_data(&self.registry, frame.stream_id, frame.payload),
                FrameType::Close => route_close(&self.registry, frame.stream_id),
            }
        }
    }

    fn open_stream(&self, id: u32) {
        if id == RAW_STREAM_ID {
            warn!("peer tried to open stream 0, ignoring");
            return;
        }
        if self.registry.contains(id) {
            warn!(stream_id = id, "duplicate open for live stream, ignoring");
            return;
        }

        let stream =
            Stream::registered(id, self.writer.clone(), self.queue_capacity, &self.registry);
        debug!(stream_id = id, "stream opened by peer");

        self.tracker
            .spawn(run_handler(Arc::clone(&self.handler), stream, self.cancel.clone()));
    }

    async fn run_compatibility(&mut self) -> CloseCode {
        let stream = Stream::registered(
            RAW_STREAM_ID,
            self.writer.clone(),
            self.queue_capacity,
            &self.registry,
        );

        let handler = Arc::clone(&self.handler);
        let handler_stream = stream.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            run_handler(handler, handler_stream, cancel.clone()).await;
            // The handler owns the whole connection in this mode.
            cancel.cancel();
        });

        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return CloseCode::NORMAL,
                message = self.reader.read_message() => message,
            };
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    debug!(error = %err, "peer connection ended");
                    return CloseCode::NORMAL;
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return CloseCode::NORMAL,
                delivered = stream.deliver(message) => {
                    if !delivered {
                        return CloseCode::NORMAL;
                    }
                }
            }
        }
    }

    async fn teardown(self, code: CloseCode) {
        self.registry.kill_all();
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        close_writer(&self.writer, code).await;
    }
}

async fn run_handler(handler: Handler, stream: Stream, cancel: CancellationToken) {
    let id = stream.id();
    tokio::select! {
        biased;
        _ = handler(stream.clone()) => {}
        _ = cancel.cancelled() => debug!(stream_id = id, "handler cancelled"),
    }
    stream.close().await;
}

/// Accept the next connection, backing off after failures.
///
/// Returns `None` once `shutdown` is cancelled.
async fn next_connection<T, F, Fut>(shutdown: &CancellationToken, mut accept: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => return None,
            accepted = accept() => accepted,
        };
        match accepted {
            Ok(conn) => return Some(conn),
            Err(err) => {
                warn!(error = %err, "accept failed");
                tokio::select! {
                    _ = shutdown.cancelled() => return None,
                    _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
            }
        }
    }
}

async fn close_writer(writer: &FrameWriter, code: CloseCode) {
    if let Err(err) = writer.close(code).await {
        debug!(error = %err, "transport close failed");
    }
}

async fn bind(address: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;
    Ok(listener)
}

fn log_listening(listener: &TcpListener, router: &Router) {
    let patterns: Vec<&str> = router.patterns().collect();
    match listener.local_addr() {
        Ok(addr) => info!(address = %addr, ?patterns, "listening"),
        Err(err) => info!(error = %err, ?patterns, "listening"),
    }
}
