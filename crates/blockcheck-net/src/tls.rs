//! Certificate pre-check
//!
//! HTTPS fetches connect by IP when asked to, so certificate validation is
//! done up front with a plain rustls handshake against the Mozilla roots.
//! The fetch itself then runs without verification.

use crate::error::{NetError, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a TLS handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Certificate chain and name verified
    Valid,
    /// The presented certificate failed verification
    CertificateRejected,
    /// Connection failed before a verdict on the certificate
    Failed,
}

/// Verifying TLS client
pub struct CertificateCheck {
    config: Arc<ClientConfig>,
    timeout: Duration,
}

impl CertificateCheck {
    /// Build a client trusting the bundled web PKI roots
    pub fn new(timeout: Duration) -> Result<Self> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| NetError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            config: Arc::new(config),
            timeout,
        })
    }

    /// Handshake with `addr`, presenting `host` as SNI and verification name
    pub fn handshake(&self, host: &str, addr: SocketAddr) -> Handshake {
        match self.try_handshake(host, addr) {
            Ok(()) => Handshake::Valid,
            Err(e) if is_certificate_error(&e) => {
                debug!(host, %addr, error = %e, "certificate rejected");
                Handshake::CertificateRejected
            }
            Err(e) => {
                debug!(host, %addr, error = %e, "TLS handshake failed");
                Handshake::Failed
            }
        }
    }

    fn try_handshake(&self, host: &str, addr: SocketAddr) -> io::Result<()> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut conn = ClientConnection::new(Arc::clone(&self.config), name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut sock = TcpStream::connect_timeout(&addr, self.timeout)?;
        sock.set_read_timeout(Some(self.timeout))?;
        sock.set_write_timeout(Some(self.timeout))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut sock)?;
        }
        conn.send_close_notify();
        // best effort, the verdict is already known
        let _ = conn.complete_io(&mut sock);
        Ok(())
    }
}

/// Whether an I/O error carries a rustls certificate verification failure
pub fn is_certificate_error(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|e| matches!(e, rustls::Error::InvalidCertificate(_)))
}
