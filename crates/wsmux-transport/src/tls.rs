use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
pub use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Build a TLS acceptor from PEM-encoded certificate chain and private key files.
pub fn acceptor(cert_file: impl AsRef<Path>, key_file: impl AsRef<Path>) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_file.as_ref())?;
    let key = load_key(key_file.as_ref())?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| tls_file_error(path, e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_file_error(path, e))?;

    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    debug!(path = %path.display(), count = certs.len(), "loaded certificate chain");
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| tls_file_error(path, e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| tls_file_error(path, e))?
        .ok_or_else(|| TransportError::Tls(format!("no private key found in {}", path.display())))
}

fn tls_file_error(path: &Path, err: std::io::Error) -> TransportError {
    TransportError::Tls(format!("{}: {err}", path.display()))
}
