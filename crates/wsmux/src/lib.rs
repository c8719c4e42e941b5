//! Many independent, bidirectional streams over one WebSocket connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: Message transport abstraction (WebSocket, in-memory)
//! - [`frame`]: 7-byte header stream framing and the shared connection writer
//! - [`tunnel`]: Streams, client with reconnect, server with path routing (behind `tunnel` feature)

/// Re-export transport types.
pub mod transport {
    pub use wsmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wsmux_frame::*;
}

/// Re-export tunnel types (requires `tunnel` feature).
#[cfg(feature = "tunnel")]
pub mod tunnel {
    pub use wsmux_tunnel::*;
}
