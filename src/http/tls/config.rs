//! TLS configuration
//!
//! This module provides TLS configuration builders for both client and server.
//! Builders only collect settings; the OpenSSL context is created and checked
//! in `build()`, so every OpenSSL failure surfaces as a [`TlsError`] there.

use openssl::pkey::PKey;
use openssl::ssl::{AlpnError, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::X509;
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    /// Parse TLS version from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self, TlsError> {
        match s.to_uppercase().as_str() {
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" | "1.0" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" | "1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" | "1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" | "1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Encode a protocol list into the ALPN wire format (length-prefixed)
pub fn encode_alpn(protocols: &[String]) -> Result<Vec<u8>, TlsError> {
    let mut alpn_bytes = Vec::new();
    for proto in protocols {
        if proto.is_empty() || proto.len() > 255 {
            return Err(TlsError::InvalidConfig(format!(
                "ALPN protocol name must be 1-255 bytes: {:?}",
                proto
            )));
        }
        alpn_bytes.push(proto.len() as u8);
        alpn_bytes.extend_from_slice(proto.as_bytes());
    }
    Ok(alpn_bytes)
}

/// Pick the first protocol offered by the client that the server supports
///
/// `client_protos` is in ALPN wire format. The returned slice borrows from it.
pub fn select_alpn<'a>(supported: &[Vec<u8>], client_protos: &'a [u8]) -> Option<&'a [u8]> {
    let mut pos = 0;
    while pos < client_protos.len() {
        let len = client_protos[pos] as usize;
        pos += 1;
        let client_proto = client_protos.get(pos..pos + len)?;
        if supported.iter().any(|p| p.as_slice() == client_proto) {
            return Some(client_proto);
        }
        pos += len;
    }
    None
}

fn read_pem<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, TlsError> {
    let mut pem = Vec::new();
    File::open(path.as_ref())?.read_to_end(&mut pem)?;
    Ok(pem)
}

fn set_version_range(
    ctx_builder: &mut SslContextBuilder,
    min: Option<TlsVersion>,
    max: Option<TlsVersion>,
) -> Result<(), TlsError> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(TlsError::InvalidConfig(format!(
                "minimum TLS version {} is above maximum {}",
                min.as_str(),
                max.as_str()
            )));
        }
    }
    ctx_builder.set_min_proto_version(min.map(|v| v.to_openssl_version()))?;
    ctx_builder.set_max_proto_version(max.map(|v| v.to_openssl_version()))?;
    Ok(())
}

fn set_identity(ctx_builder: &mut SslContextBuilder, pem: &[u8], what: &str) -> Result<(), TlsError> {
    let cert = X509::from_pem(pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load {} certificate: {}", what, e)))?;
    ctx_builder.set_certificate(&cert)?;

    let key = PKey::private_key_from_pem(pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load {} private key: {}", what, e)))?;
    ctx_builder.set_private_key(&key)?;
    ctx_builder.check_private_key()?;
    Ok(())
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: openssl::ssl::SslContext,
    pub(crate) is_server: bool,
    pub(crate) servername: Option<String>,
    /// Address the peer certificate must name when there is no servername
    pub(crate) peer_ip: Option<IpAddr>,
    pub(crate) verify_peer: bool,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Create a new server configuration builder
    pub fn server() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    pub fn peer_ip(&self) -> Option<IpAddr> {
        self.peer_ip
    }

    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// Connect to a server with TLS (client-side)
    pub fn connect(&self, stream: std::net::TcpStream) -> Result<super::TlsSession, TlsError> {
        if self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use server config for client connection".to_string(),
            ));
        }
        super::session::TlsSession::connect(stream, self)
    }

    /// Accept a client connection with TLS (server-side)
    pub fn accept(&self, stream: std::net::TcpStream) -> Result<super::TlsSession, TlsError> {
        if !self.is_server {
            return Err(TlsError::InvalidConfig(
                "Cannot use client config for server accept".to_string(),
            ));
        }
        super::session::TlsSession::accept(stream, self)
    }
}

/// Client configuration builder
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    alpn: Vec<String>,
    servername: Option<String>,
    peer_ip: Option<IpAddr>,
    verify_peer: bool,
    ca_file: Option<PathBuf>,
    cert_pem: Option<Vec<u8>>,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        // Default: don't verify peer (for testing)
        ClientConfigBuilder::default()
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    pub fn min_version(mut self, min: Option<TlsVersion>) -> Self {
        self.min_version = min;
        self
    }

    pub fn max_version(mut self, max: Option<TlsVersion>) -> Self {
        self.max_version = max;
        self
    }

    /// Set ALPN protocols, in preference order
    pub fn alpn<S: AsRef<str>>(mut self, protocols: &[S]) -> Self {
        self.alpn = protocols.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Set SNI servername
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Check the certificate against this address (no SNI is sent for it)
    ///
    /// Used only when no servername is set.
    pub fn peer_ip(mut self, ip: IpAddr) -> Self {
        self.peer_ip = Some(ip);
        self
    }

    /// Enable/disable peer certificate and hostname verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Trust anchors for peer verification (defaults to the system store)
    pub fn ca_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.ca_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load client certificate and key from a single PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, TlsError> {
        self.cert_pem = Some(read_pem(path)?);
        Ok(self)
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        set_version_range(&mut ctx_builder, self.min_version, self.max_version)?;

        if !self.alpn.is_empty() {
            ctx_builder.set_alpn_protos(&encode_alpn(&self.alpn)?)?;
        }

        if self.verify_peer {
            match &self.ca_file {
                Some(path) => ctx_builder.set_ca_file(path)?,
                None => ctx_builder.set_default_verify_paths()?,
            }
            ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            ctx_builder.set_verify(SslVerifyMode::NONE);
        }

        if let Some(pem) = &self.cert_pem {
            set_identity(&mut ctx_builder, pem, "client")?;
        }

        Ok(TlsConfig {
            ctx: ctx_builder.build(),
            is_server: false,
            servername: self.servername,
            peer_ip: self.peer_ip,
            verify_peer: self.verify_peer,
        })
    }
}

/// Server configuration builder
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    alpn: Vec<String>,
    cert_pem: Option<Vec<u8>>,
}

impl ServerConfigBuilder {
    fn new() -> Self {
        ServerConfigBuilder::default()
    }

    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set the ALPN protocols the server is willing to select
    pub fn alpn<S: AsRef<str>>(mut self, protocols: &[S]) -> Self {
        self.alpn = protocols.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Load server certificate and key from a single PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, TlsError> {
        self.cert_pem = Some(read_pem(path)?);
        Ok(self)
    }

    /// Use an in-memory PEM bundle (certificate followed by key)
    pub fn cert_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.cert_pem = Some(pem.into());
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_server())?;

        set_version_range(&mut ctx_builder, self.min_version, self.max_version)?;

        match &self.cert_pem {
            Some(pem) => set_identity(&mut ctx_builder, pem, "server")?,
            // If no certificate was loaded, use the built-in certificate
            None => set_identity(
                &mut ctx_builder,
                super::builtin_cert::BUILTIN_CERT.as_bytes(),
                "built-in",
            )?,
        }

        if !self.alpn.is_empty() {
            // Validate names the same way the client side does
            encode_alpn(&self.alpn)?;
            let supported: Vec<Vec<u8>> = self.alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
            ctx_builder.set_alpn_select_callback(move |_ssl, client_protos| {
                select_alpn(&supported, client_protos).ok_or(AlpnError::NOACK)
            });
        }

        Ok(TlsConfig {
            ctx: ctx_builder.build(),
            is_server: true,
            servername: None,
            peer_ip: None,
            verify_peer: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_version_parsing() {
        assert_eq!("TLSv1.2".parse::<TlsVersion>().unwrap(), TlsVersion::Tls12);
        assert_eq!("tlsv1.3".parse::<TlsVersion>().unwrap(), TlsVersion::Tls13);
        assert_eq!("1.3".parse::<TlsVersion>().unwrap(), TlsVersion::Tls13);
        assert_eq!("TLS1.0".parse::<TlsVersion>().unwrap(), TlsVersion::Tls10);
        assert!("invalid".parse::<TlsVersion>().is_err());
    }

    #[test]
    fn test_encode_alpn() {
        let encoded = encode_alpn(&["h2".to_string(), "http/1.1".to_string()]).unwrap();
        assert_eq!(encoded, b"\x02h2\x08http/1.1".to_vec());

        assert!(encode_alpn(&[String::new()]).is_err());
        assert!(encode_alpn(&["x".repeat(256)]).is_err());
    }

    #[test]
    fn test_select_alpn_prefers_client_order() {
        let supported = vec![b"http/1.1".to_vec(), b"h2".to_vec()];
        let offered = b"\x02h2\x08http/1.1";
        assert_eq!(select_alpn(&supported, offered), Some(&b"h2"[..]));

        let supported = vec![b"http/1.1".to_vec()];
        assert_eq!(select_alpn(&supported, offered), Some(&b"http/1.1"[..]));

        let supported = vec![b"h3".to_vec()];
        assert_eq!(select_alpn(&supported, offered), None);
    }

    #[test]
    fn test_select_alpn_truncated_list() {
        let supported = vec![b"h2".to_vec()];
        assert_eq!(select_alpn(&supported, b"\x05h2"), None);
    }

    #[test]
    fn test_client_config_builder() {
        let config = TlsConfig::client()
            .version(TlsVersion::Tls13)
            .servername("example.com")
            .verify_peer(false)
            .alpn(&["h2", "http/1.1"])
            .build()
            .unwrap();

        assert!(!config.is_server());
        assert_eq!(config.servername(), Some("example.com"));
        assert!(!config.verify_peer());
    }

    #[test]
    fn test_inverted_version_range_rejected() {
        let result = TlsConfig::client()
            .version_range(TlsVersion::Tls13, TlsVersion::Tls12)
            .build();
        assert!(matches!(result, Err(TlsError::InvalidConfig(_))));
    }

    #[test]
    fn test_server_config_builder() {
        // Server with built-in cert
        let config = TlsConfig::server()
            .version(TlsVersion::Tls13)
            .alpn(&["h2"])
            .build()
            .unwrap();

        assert!(config.is_server());
    }

    #[test]
    fn test_server_bad_pem_rejected() {
        let result = TlsConfig::server().cert_pem("not a pem").build();
        assert!(matches!(result, Err(TlsError::Certificate(_))));
    }
}
