use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{
    BoxFuture, CloseCode, Dialer, MessageConn, MessageSink, MessageSource, UpgradeRequest,
};

/// WebSocket transport.
///
/// Dials `ws://` addresses and upgrades accepted sockets. Every transport
/// message is a single binary WebSocket message.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocket;

impl WebSocket {
    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "websocket"
    }
}

impl Dialer for WebSocket {
    fn dial<'a>(
        &'a self,
        address: &'a str,
        headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<MessageConn>> {
        Box::pin(connect(address, headers))
    }
}

/// Open a WebSocket connection to `address`, sending `headers` with the
/// upgrade request.
pub async fn connect(address: &str, headers: &[(String, String)]) -> Result<MessageConn> {
    let mut request = address
        .into_client_request()
        .map_err(|e| TransportError::Connect {
            address: address.to_string(),
            source: Box::new(e),
        })?;

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidHeader(format!("{}: {e}", name.as_str())))?;
        request.headers_mut().insert(name, value);
    }

    let (socket, response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| TransportError::Connect {
            address: address.to_string(),
            source: Box::new(e),
        })?;
    debug!(%address, status = %response.status(), "connected websocket");

    Ok(from_socket(socket, address.to_string()))
}

/// Perform the server side of the WebSocket upgrade on an accepted socket.
///
/// `allow` inspects the upgrade request before the handshake completes;
/// returning `false` rejects the request with `404 Not Found`.
pub async fn accept<S, F>(io: S, peer: String, allow: F) -> Result<(MessageConn, UpgradeRequest)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(&UpgradeRequest) -> bool + Send + Unpin,
{
    let mut observed: Option<UpgradeRequest> = None;
    let callback_peer = peer.clone();
    let callback = |request: &Request,
                    response: Response|
     -> std::result::Result<Response, ErrorResponse> {
        let upgrade = upgrade_request(request, callback_peer);
        if !allow(&upgrade) {
            debug!(path = %upgrade.path, peer = %upgrade.peer, "rejecting upgrade: no route");
            let mut rejection = ErrorResponse::new(Some("no handler for path".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            return Err(rejection);
        }
        observed = Some(upgrade);
        Ok(response)
    };

    let socket = tokio_tungstenite::accept_hdr_async(io, callback)
        .await
        .map_err(TransportError::Accept)?;
    let request = observed.ok_or(TransportError::Closed)?;
    debug!(path = %request.path, %peer, "accepted websocket");

    Ok((from_socket(socket, peer), request))
}

fn upgrade_request(request: &Request, peer: String) -> UpgradeRequest {
    let headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect();

    UpgradeRequest {
        path: request.uri().path().to_string(),
        headers,
        peer,
    }
}

fn from_socket<S>(socket: WebSocketStream<S>, peer: String) -> MessageConn
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, source) = socket.split();
    MessageConn::new(
        Box::new(WsSink { inner: sink }),
        Box::new(WsSource { inner: source }),
        peer,
    )
}

struct WsSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> MessageSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn send(&mut self, message: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.inner
                .send(Message::Binary(message.to_vec()))
                .await
                .map_err(map_send_error)
        })
    }

    fn close(&mut self, code: CloseCode) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let frame = CloseFrame {
                code: WsCloseCode::from(code.0),
                reason: "".into(),
            };
            match self.inner.send(Message::Close(Some(frame))).await {
                Ok(()) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(())
                }
                Err(err) => return Err(err.into()),
            }
            let _ = self.inner.close().await;
            Ok(())
        })
    }
}

struct WsSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

impl<S> MessageSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move {
            while let Some(message) = self.inner.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                        return Ok(None)
                    }
                    Err(err) => return Err(err.into()),
                };
                match message {
                    Message::Binary(data) => return Ok(Some(Bytes::from(data))),
                    Message::Text(text) => return Ok(Some(Bytes::from(text))),
                    Message::Close(frame) => {
                        debug!(?frame, "peer closed websocket");
                        return Ok(None);
                    }
                    // Control frames are answered by tungstenite itself.
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                }
            }
            Ok(None)
        })
    }
}

fn map_send_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn loopback() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, format!("ws://{addr}"))
    }

    #[tokio::test]
    async fn dial_accept_roundtrip() {
        let (listener, base) = loopback().await;

        let server = tokio::spawn(async move {
            let (tcp, addr) = listener.accept().await.unwrap();
            let (mut conn, request) = accept(tcp, addr.to_string(), |_| true).await.unwrap();
            assert_eq!(request.path, "/echo");
            assert_eq!(request.header("x-test"), Some("yes"));
            let message = conn.recv().await.unwrap().unwrap();
            conn.send(message).await.unwrap();
            conn.close(CloseCode::NORMAL).await.unwrap();
        });

        let headers = vec![("x-test".to_string(), "yes".to_string())];
        let mut conn = connect(&format!("{base}/echo"), &headers).await.unwrap();
        conn.send(Bytes::from_static(b"hello")).await.unwrap();
        let echoed = conn.recv().await.unwrap().unwrap();
        assert_eq!(echoed.as_ref(), b"hello");
        assert!(conn.recv().await.unwrap().is_none());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_upgrade_fails_dial() {
        let (listener, base) = loopback().await;

        let server = tokio::spawn(async move {
            let (tcp, addr) = listener.accept().await.unwrap();
            accept(tcp, addr.to_string(), |req| req.path == "/only").await
        });

        let result = connect(&format!("{base}/other"), &[]).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        assert!(matches!(
            server.await.unwrap(),
            Err(TransportError::Accept(_))
        ));
    }

    #[tokio::test]
    async fn invalid_header_rejected_before_dialing() {
        let headers = vec![("bad header".to_string(), "x".to_string())];
        let result = connect("ws://127.0.0.1:9/", &headers).await;
        assert!(matches!(result, Err(TransportError::InvalidHeader(_))));
    }

    #[test]
    fn transport_name() {
        assert_eq!(WebSocket.transport_name(), "websocket");
    }
}
