use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

/// Boxed future returned by the object-safe transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Close status sent to the peer when a connection is shut down.
///
/// Values follow the WebSocket close code registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// The endpoint is going away (server shutdown, client stop).
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// The peer violated the framing protocol.
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// The peer was refused (e.g. incompatible protocol version).
    pub const POLICY_VIOLATION: CloseCode = CloseCode(1008);
}

/// Sending half of a message-oriented connection.
///
/// Implementations are not required to support concurrent senders; callers
/// serialize access themselves.
pub trait MessageSink: Send {
    /// Send one complete message.
    fn send(&mut self, message: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Close the connection with the given status code.
    fn close(&mut self, code: CloseCode) -> BoxFuture<'_, Result<()>>;
}

/// Receiving half of a message-oriented connection.
pub trait MessageSource: Send {
    /// Receive the next complete message.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>>;
}

/// Opens client connections to a remote address.
pub trait Dialer: Send + Sync {
    /// Open a connection, sending `headers` with the connection request.
    fn dial<'a>(
        &'a self,
        address: &'a str,
        headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<MessageConn>>;
}

/// A connected, reliable, ordered, message-framed connection.
///
/// This is the fundamental type returned by transport operations. It is
/// split into its halves so that one task can own the receive side while
/// the send side sits behind a lock.
pub struct MessageConn {
    sink: Box<dyn MessageSink>,
    source: Box<dyn MessageSource>,
    peer: String,
}

impl MessageConn {
    /// Assemble a connection from its two halves.
    pub fn new(
        sink: Box<dyn MessageSink>,
        source: Box<dyn MessageSource>,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            source,
            peer: peer.into(),
        }
    }

    /// Human-readable description of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one message.
    pub async fn send(&mut self, message: impl Into<Bytes>) -> Result<()> {
        self.sink.send(message.into()).await
    }

    /// Receive one message, `None` once the peer has closed.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        self.source.recv().await
    }

    /// Close the connection.
    pub async fn close(&mut self, code: CloseCode) -> Result<()> {
        self.sink.close(code).await
    }

    /// Split into independently owned halves.
    pub fn into_split(self) -> (Box<dyn MessageSink>, Box<dyn MessageSource>) {
        (self.sink, self.source)
    }
}

impl std::fmt::Debug for MessageConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageConn")
            .field("peer", &self.peer)
            .finish()
    }
}

/// Connection-establishment metadata observed by the accepting side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request path (without query string).
    pub path: String,
    /// Request headers as `(name, value)` pairs; names are lowercase.
    pub headers: Vec<(String, String)>,
    /// Remote address or description of the peer.
    pub peer: String,
}

impl UpgradeRequest {
    /// Create a request description for `path`.
    pub fn new(path: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: Vec::new(),
            peer: peer.into(),
        }
    }

    /// Attach a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Extract the path component of a `scheme://host[:port]/path?query` address.
pub fn path_of(address: &str) -> &str {
    let rest = match address.find("://") {
        Some(idx) => &address[idx + 3..],
        None => address,
    };
    let path = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    };
    match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    }
}
