use std::fmt;
use std::io;

use wsmux_frame::FrameError;
use wsmux_transport::TransportError;
use wsmux_tunnel::TunnelError;

// Exit code constants aligned with sysexits-style semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::Connect { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        TransportError::InvalidHeader(_) | TransportError::Tls(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn tunnel_error(context: &str, err: TunnelError) -> CliError {
    match err {
        TunnelError::Connection(err) => transport_error(context, err),
        TunnelError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        TunnelError::Protocol(err) => frame_error(context, err),
        TunnelError::Io(source) => io_error(context, source),
        TunnelError::TunnelClosed | TunnelError::StreamClosed(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        TunnelError::Handshake(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        TunnelError::StreamIdsExhausted => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_failure_is_plain_failure() {
        let err = TunnelError::Connection(TransportError::Connect {
            address: "ws://127.0.0.1:1/".to_string(),
            source: Box::new(io::Error::from(io::ErrorKind::ConnectionRefused)),
        });
        let cli = tunnel_error("connect failed", err);
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.starts_with("connect failed: "));
    }

    #[test]
    fn oversized_payload_is_data_invalid() {
        let err = TunnelError::PayloadTooLarge {
            size: 70_000,
            max: 65_535,
        };
        assert_eq!(tunnel_error("send failed", err).code, DATA_INVALID);
    }

    #[test]
    fn bind_permission_denied() {
        let err = TransportError::Bind {
            address: "0.0.0.0:80".to_string(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(transport_error("bind failed", err).code, PERMISSION_DENIED);
    }
}
