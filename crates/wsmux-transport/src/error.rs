use tokio_tungstenite::tungstenite;

/// Errors that can occur in message transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// Failed to open a connection to the specified address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The WebSocket upgrade of an incoming connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] tungstenite::Error),

    /// A WebSocket protocol or I/O error on an established connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// An I/O error occurred on the underlying socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A connection header could not be encoded.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// TLS material could not be loaded or the TLS handshake failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// The connection has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
