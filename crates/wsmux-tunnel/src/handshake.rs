//! Capability negotiation.
//!
//! Multiplexing clients send a `websocket-mux: <major>.<minor>` header with
//! the upgrade request. Servers treat its absence as a peer that does not
//! speak the framing protocol and fall back to compatibility mode.

use wsmux_transport::UpgradeRequest;

use crate::error::{Result, TunnelError};

/// Upgrade request header that advertises multiplexing support.
pub const MUX_HEADER: &str = "websocket-mux";

/// Protocol version spoken by this implementation.
pub const MUX_VERSION: &str = "1.0";

const MAX_VERSION_LEN: usize = 16;

/// How a connection will be driven after the upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiated {
    /// Framed multiplexing; carries the version the peer advertised.
    Multiplexed { version: String },
    /// Whole connection is one implicit stream with id 0.
    Compatibility,
}

impl Negotiated {
    pub fn is_multiplexed(&self) -> bool {
        matches!(self, Negotiated::Multiplexed { .. })
    }
}

/// Headers a client sends with its upgrade request.
pub fn client_headers(version: &str) -> Vec<(String, String)> {
    vec![(MUX_HEADER.to_string(), version.to_string())]
}

/// Decide the connection mode from the peer's upgrade request.
///
/// Fails when the peer advertises a version whose major differs from
/// `local_version`, or one that does not parse.
pub fn negotiate(request: &UpgradeRequest, local_version: &str) -> Result<Negotiated> {
    let Some(remote) = request.header(MUX_HEADER) else {
        return Ok(Negotiated::Compatibility);
    };
    let remote = remote.trim();

    if !is_version_compatible(remote, local_version)? {
        return Err(TunnelError::Handshake(format!(
            "incompatible version '{remote}' (local '{local_version}')"
        )));
    }

    Ok(Negotiated::Multiplexed {
        version: remote.to_string(),
    })
}

/// Versions are compatible when their majors match.
pub fn is_version_compatible(remote: &str, local: &str) -> Result<bool> {
    let (remote_major, _) = parse_version(remote)?;
    let (local_major, _) = parse_version(local)?;
    Ok(remote_major == local_major)
}

/// Parse `<major>.<minor>`.
pub fn parse_version(version: &str) -> Result<(u16, u16)> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(TunnelError::Handshake(format!(
            "invalid version length: {}",
            version.len()
        )));
    }

    let mut parts = version.split('.');
    let major = parts.next().ok_or_else(|| {
        TunnelError::Handshake(format!("invalid version '{version}': missing major"))
    })?;
    let minor = parts.next().ok_or_else(|| {
        TunnelError::Handshake(format!("invalid version '{version}': missing minor"))
    })?;

    if parts.next().is_some() {
        return Err(TunnelError::Handshake(format!(
            "invalid version '{version}': expected '<major>.<minor>'"
        )));
    }

    let major = major.parse::<u16>().map_err(|_| {
        TunnelError::Handshake(format!("invalid version '{version}': non-numeric major"))
    })?;
    let minor = minor.parse::<u16>().map_err(|_| {
        TunnelError::Handshake(format!("invalid version '{version}': non-numeric minor"))
    })?;

    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_compatibility_mode() {
        let request = UpgradeRequest::new("/echo", "test");
        assert_eq!(
            negotiate(&request, MUX_VERSION).unwrap(),
            Negotiated::Compatibility
        );
    }

    #[test]
    fn same_major_is_multiplexed() {
        let request = UpgradeRequest::new("/echo", "test").with_header("WebSocket-Mux", "1.4");
        let negotiated = negotiate(&request, MUX_VERSION).unwrap();
        assert!(negotiated.is_multiplexed());
        assert_eq!(
            negotiated,
            Negotiated::Multiplexed {
                version: "1.4".to_string()
            }
        );
    }

    #[test]
    fn different_major_is_refused() {
        let request = UpgradeRequest::new("/echo", "test").with_header(MUX_HEADER, "2.0");
        let err = negotiate(&request, MUX_VERSION).unwrap_err();
        assert!(matches!(err, TunnelError::Handshake(msg) if msg.contains("incompatible")));
    }

    #[test]
    fn malformed_versions_rejected() {
        for bad in ["", "1", "1.0.0", "a.b", "1.x", "12345678901234567"] {
            assert!(parse_version(bad).is_err(), "{bad:?} should not parse");
        }
        assert_eq!(parse_version("3.14").unwrap(), (3, 14));
    }

    #[test]
    fn client_headers_advertise_version() {
        assert_eq!(
            client_headers("1.0"),
            vec![("websocket-mux".to_string(), "1.0".to_string())]
        );
    }
}
