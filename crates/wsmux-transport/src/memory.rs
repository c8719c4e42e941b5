//! In-process transport.
//!
//! Connections are pairs of unbounded channels, so message order and
//! reliability match a WebSocket without touching the network. Used by
//! tests and by embedders that run client and server in one process.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{
    path_of, BoxFuture, CloseCode, Dialer, MessageConn, MessageSink, MessageSource, UpgradeRequest,
};

/// Create two connected ends of an in-memory connection.
pub fn pair() -> (MessageConn, MessageConn) {
    let (left_tx, left_rx) = mpsc::unbounded_channel();
    let (right_tx, right_rx) = mpsc::unbounded_channel();

    let left = MessageConn::new(
        Box::new(MemorySink { tx: Some(left_tx) }),
        Box::new(MemorySource { rx: right_rx }),
        "memory",
    );
    let right = MessageConn::new(
        Box::new(MemorySink { tx: Some(right_tx) }),
        Box::new(MemorySource { rx: left_rx }),
        "memory",
    );
    (left, right)
}

/// Create a dialer and the listener that receives its connections.
pub fn listener() -> (MemoryDialer, MemoryListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryDialer { tx }, MemoryListener { rx })
}

/// Client side of an in-memory listener. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryDialer {
    tx: mpsc::UnboundedSender<(MessageConn, UpgradeRequest)>,
}

impl Dialer for MemoryDialer {
    fn dial<'a>(
        &'a self,
        address: &'a str,
        headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<MessageConn>> {
        Box::pin(async move {
            let (client, server) = pair();
            let mut request = UpgradeRequest::new(path_of(address), "memory");
            for (name, value) in headers {
                request = request.with_header(name, value.clone());
            }

            self.tx
                .send((server, request))
                .map_err(|_| TransportError::Connect {
                    address: address.to_string(),
                    source: Box::new(std::io::Error::from(
                        std::io::ErrorKind::ConnectionRefused,
                    )),
                })?;
            debug!(%address, "connected in-memory transport");
            Ok(client)
        })
    }
}

/// Server side of an in-memory listener.
#[derive(Debug)]
pub struct MemoryListener {
    rx: mpsc::UnboundedReceiver<(MessageConn, UpgradeRequest)>,
}

impl MemoryListener {
    /// Wait for the next dialed connection. `None` once every dialer is gone.
    pub async fn accept(&mut self) -> Option<(MessageConn, UpgradeRequest)> {
        self.rx.recv().await
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

impl MessageSink for MemorySink {
    fn send(&mut self, message: Bytes) -> BoxFuture<'_, Result<()>> {
        let result = match &self.tx {
            Some(tx) => tx.send(message).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        };
        Box::pin(async move { result })
    }

    fn close(&mut self, _code: CloseCode) -> BoxFuture<'_, Result<()>> {
        self.tx = None;
        Box::pin(async { Ok(()) })
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl MessageSource for MemorySource {
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move { Ok(self.rx.recv().await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_in_order() {
        let (mut left, mut right) = pair();
        for i in 0..10u8 {
            left.send(vec![i]).await.unwrap();
        }
        for i in 0..10u8 {
            assert_eq!(right.recv().await.unwrap().unwrap().as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn close_signals_end_of_messages() {
        let (mut left, mut right) = pair();
        left.send(Bytes::from_static(b"last")).await.unwrap();
        left.close(CloseCode::NORMAL).await.unwrap();

        assert_eq!(right.recv().await.unwrap().unwrap().as_ref(), b"last");
        assert!(right.recv().await.unwrap().is_none());
        assert!(matches!(
            left.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn send_after_peer_dropped_fails() {
        let (mut left, right) = pair();
        drop(right);
        assert!(matches!(
            left.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn dialer_hands_connection_to_listener() {
        let (dialer, mut listener) = listener();
        let headers = vec![("WebSocket-Mux".to_string(), "1.0".to_string())];
        let mut client = dialer
            .dial("memory://local/echo", &headers)
            .await
            .unwrap();

        let (mut server, request) = listener.accept().await.unwrap();
        assert_eq!(request.path, "/echo");
        assert_eq!(request.header("websocket-mux"), Some("1.0"));

        client.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap().as_ref(), b"ping");
    }

    #[tokio::test]
    async fn dial_without_listener_is_refused() {
        let (dialer, listener) = listener();
        drop(listener);
        let result = dialer.dial("memory://local/", &[]).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
