//! Message transport abstraction for wsmux.
//!
//! The multiplexer needs a reliable, ordered, message-framed, full-duplex
//! connection and nothing more. This crate defines that contract
//! ([`MessageSink`], [`MessageSource`], [`Dialer`]) and provides:
//! - WebSocket over TCP (dial and server-side upgrade)
//! - In-memory connection pairs for tests and embedding
//! - TLS acceptor construction (behind the `tls` feature)
//!
//! This is the lowest layer of wsmux. Everything else builds on top of
//! the [`MessageConn`] type provided here.

pub mod error;
pub mod memory;
pub mod traits;
pub mod ws;

#[cfg(feature = "tls")]
pub mod tls;

pub use error::{Result, TransportError};
pub use traits::{
    path_of, BoxFuture, CloseCode, Dialer, MessageConn, MessageSink, MessageSource,
    UpgradeRequest,
};
pub use ws::WebSocket;
