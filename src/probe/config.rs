//! Probe configuration

use crate::http::h2::{ProbeRequest, ALPN_H2, ALPN_HTTP11};
use crate::http::tls::{TlsConfig, TlsVersion};
use crate::{Error, Result};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Marker whose presence in the response counts as success
pub const DEFAULT_MARKER: &str = "Hello from HTTP/2";

pub const DEFAULT_HOST: &str = "localhost";

pub const DEFAULT_PORT: u16 = 8080;

/// Bytes requested per read
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a probe run needs (immutable after building)
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub host: String,
    pub port: u16,
    /// SNI name; the host is used when unset
    pub servername: Option<String>,
    /// ALPN protocols offered, in preference order
    pub alpn: Vec<String>,
    pub verify_peer: bool,
    pub ca_file: Option<PathBuf>,
    pub tls_min: Option<TlsVersion>,
    pub tls_max: Option<TlsVersion>,
    pub connect_timeout: Option<Duration>,
    /// Bounds the handshake and every read while waiting for the response
    pub read_timeout: Option<Duration>,
    pub read_buffer_size: usize,
    pub marker: Vec<u8>,
    pub request: ProbeRequest,
}

impl ProbeConfig {
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::new()
    }

    /// SNI name sent in the ClientHello
    pub fn servername(&self) -> &str {
        self.servername.as_deref().unwrap_or(&self.host)
    }

    /// Client TLS configuration for this probe
    pub fn tls_config(&self) -> Result<TlsConfig> {
        let mut builder = TlsConfig::client()
            .min_version(self.tls_min)
            .max_version(self.tls_max)
            .alpn(self.alpn.as_slice())
            .verify_peer(self.verify_peer);
        // SNI carries host names only; an address literal is verified as an IP
        builder = match self.servername().parse::<IpAddr>() {
            Ok(ip) => builder.peer_ip(ip),
            Err(_) => builder.servername(self.servername()),
        };
        if let Some(ca_file) = &self.ca_file {
            builder = builder.ca_file(ca_file);
        }
        Ok(builder.build()?)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            servername: None,
            alpn: vec![ALPN_H2.to_string(), ALPN_HTTP11.to_string()],
            verify_peer: false,
            ca_file: None,
            tls_min: None,
            tls_max: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            marker: DEFAULT_MARKER.as_bytes().to_vec(),
            request: ProbeRequest::fixed(),
        }
    }
}

/// Builder for [`ProbeConfig`]
#[derive(Debug, Clone, Default)]
pub struct ProbeConfigBuilder {
    config: ProbeConfig,
}

impl ProbeConfigBuilder {
    pub fn new() -> Self {
        ProbeConfigBuilder::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.config.servername = Some(name.into());
        self
    }

    pub fn alpn<S: AsRef<str>>(mut self, protocols: &[S]) -> Self {
        self.config.alpn = protocols.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.config.verify_peer = verify;
        self
    }

    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_file = Some(path.into());
        self
    }

    pub fn tls_versions(mut self, min: Option<TlsVersion>, max: Option<TlsVersion>) -> Self {
        self.config.tls_min = min;
        self.config.tls_max = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    pub fn marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        self.config.marker = marker.into();
        self
    }

    /// Send an HPACK-encoded header list instead of the fixed HEADERS frame
    pub fn request_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.config.request = ProbeRequest::with_headers(headers);
        self
    }

    pub fn build(self) -> Result<ProbeConfig> {
        let config = self.config;

        if config.host.is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if config.port == 0 {
            return Err(Error::Config("port must not be 0".to_string()));
        }
        if config.read_buffer_size == 0 {
            return Err(Error::Config("read buffer size must not be 0".to_string()));
        }
        if config.marker.is_empty() {
            return Err(Error::Config("marker must not be empty".to_string()));
        }
        if config.alpn.is_empty() {
            return Err(Error::Config("at least one ALPN protocol is required".to_string()));
        }
        for timeout in [config.connect_timeout, config.read_timeout].into_iter().flatten() {
            if timeout.is_zero() {
                return Err(Error::Config("timeouts must be non-zero".to_string()));
            }
        }
        // Fails here rather than after connecting
        config.request.to_bytes()?;

        Ok(config)
    }
}
