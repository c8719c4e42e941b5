//! Stream multiplexing over a single WebSocket connection.
//!
//! A [`Client`] opens any number of independent, bidirectional [`Stream`]s to
//! a [`Server`] over one physical connection. Every stream has its own
//! bounded inbound queue, so one slow consumer never stalls the others.
//!
//! ```no_run
//! use wsmux_tunnel::{Client, Server};
//!
//! # async fn demo() -> wsmux_tunnel::Result<()> {
//! let mut server = Server::new();
//! server.handle("/echo", |stream: wsmux_tunnel::Stream| async move {
//!     while let Some(message) = stream.read().await {
//!         if stream.write(&message).await.is_err() {
//!             break;
//!         }
//!     }
//! });
//! tokio::spawn(server.listen_and_serve("127.0.0.1:8080"));
//!
//! let client = Client::new("ws://127.0.0.1:8080/echo");
//! client.start().await?;
//! let stream = client.dial_stream().await?;
//! stream.write(b"ping").await?;
//! let reply = stream.read().await;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod demux;
pub mod error;
pub mod handshake;
pub mod registry;
pub mod router;
pub mod server;
pub mod stream;

pub use client::{Client, Supervisor};
pub use config::{TunnelConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::{Result, TunnelError};
pub use handshake::{Negotiated, MUX_HEADER, MUX_VERSION};
pub use registry::Registry;
pub use router::{handler, Handler, Router};
pub use server::Server;
pub use stream::Stream;
