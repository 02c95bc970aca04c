//! TLS sessions
//!
//! A `TlsSession` owns one handshaken OpenSSL stream over a TCP socket and
//! exposes it as plain `Read`/`Write`.

use super::config::{TlsConfig, TlsError};
use super::info::TlsInfo;
use openssl::ssl::{Ssl, SslStream};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

pub struct TlsSession {
    stream: SslStream<TcpStream>,
    info: TlsInfo,
    failed: bool,
}

impl TlsSession {
    /// Create a client TLS connection (perform handshake)
    pub fn connect(tcp_stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        if let Some(servername) = &config.servername {
            ssl.set_hostname(servername)?;
        }

        if config.verify_peer {
            match (&config.servername, config.peer_ip) {
                (Some(servername), _) => ssl.param_mut().set_host(servername)?,
                (None, Some(ip)) => ssl.param_mut().set_ip(ip)?,
                (None, None) => {
                    tracing::warn!("no servername or address to verify, checking the chain only")
                }
            }
        }

        // Blocking handshake; a read timeout on the socket bounds it
        let ssl_stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))?;

        let info = TlsInfo::from_ssl(ssl_stream.ssl());
        tracing::debug!(
            version = %info.version,
            cipher = %info.cipher,
            alpn = ?info.alpn,
            "TLS handshake complete"
        );

        Ok(TlsSession {
            stream: ssl_stream,
            info,
            failed: false,
        })
    }

    /// Accept a client connection with TLS (perform handshake)
    pub fn accept(tcp_stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let ssl = Ssl::new(&config.ctx)?;

        let ssl_stream = ssl
            .accept(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Accept failed: {}", e)))?;

        let info = TlsInfo::from_ssl(ssl_stream.ssl());

        Ok(TlsSession {
            stream: ssl_stream,
            info,
            failed: false,
        })
    }

    /// Negotiated TLS parameters
    pub fn info(&self) -> &TlsInfo {
        &self.info
    }

    /// The ALPN protocol the server selected
    pub fn alpn_protocol(&self) -> Option<&str> {
        self.info.alpn()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.get_ref().peer_addr()
    }

    /// Check if an I/O operation on the session failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Get reference to underlying TCP stream
    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    /// Send close_notify (unless the session already failed) and shut the
    /// socket down
    pub fn close(&mut self) -> Result<(), TlsError> {
        if !self.failed {
            // The peer may already be gone; close_notify is best effort
            if let Err(e) = self.stream.shutdown() {
                tracing::debug!("TLS shutdown: {}", e);
            }
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TlsError::Io(e)),
        }
    }
}

impl Read for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).map_err(|e| {
            self.failed = true;
            e
        })
    }
}

impl Write for TlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf).map_err(|e| {
            self.failed = true;
            e
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().map_err(|e| {
            self.failed = true;
            e
        })
    }
}
