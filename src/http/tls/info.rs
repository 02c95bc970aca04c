//! Negotiated TLS parameters
//!
//! Populated once the handshake completes and carried alongside the session
//! so reports do not need to reach back into OpenSSL.

use super::cert::{peer_certificate, CertInfo};
use openssl::ssl::{NameType, SslRef};

/// TLS parameters available after handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername
    pub servername: Option<String>,

    /// Negotiated ALPN protocol
    pub alpn: Option<String>,

    /// Whether session was resumed
    pub sess_reused: bool,

    /// Peer certificate, if one was presented
    pub peer_cert: Option<CertInfo>,
}

impl TlsInfo {
    pub fn from_ssl(ssl: &SslRef) -> Self {
        TlsInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            alpn: ssl
                .selected_alpn_protocol()
                .map(|p| String::from_utf8_lossy(p).to_string()),
            sess_reused: ssl.session_reused(),
            peer_cert: peer_certificate(ssl),
        }
    }

    /// The selected ALPN protocol, or `None` when the server picked nothing
    pub fn alpn(&self) -> Option<&str> {
        self.alpn.as_deref()
    }
}
