//! HTTP/2-over-TLS responder
//!
//! Accepts TLS connections, and for those that negotiate `h2` drives an
//! [`H2Session`] until the client goes away. Connections that negotiate
//! anything else are closed right after the handshake.

use super::session::H2Session;
use super::{ALPN_H2, ALPN_HTTP11};
use crate::http::tls::{ServerConfigBuilder, TlsConfig, TlsVersion};
use crate::{Error, Result};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

const READ_BUFFER_SIZE: usize = 16384;

/// Builder for [`ResponderServer`]
pub struct ResponderServerBuilder {
    tls: ServerConfigBuilder,
    idle_timeout: Option<Duration>,
}

impl ResponderServerBuilder {
    pub fn new() -> Self {
        ResponderServerBuilder {
            tls: TlsConfig::server().alpn(&[ALPN_H2, ALPN_HTTP11]),
            idle_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Protocols the server will agree to during ALPN
    pub fn alpn<S: AsRef<str>>(mut self, protocols: &[S]) -> Self {
        self.tls = self.tls.alpn(protocols);
        self
    }

    /// Serve this PEM bundle instead of the built-in certificate
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.tls = self.tls.cert_file(path)?;
        Ok(self)
    }

    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.tls = self.tls.version_range(min, max);
        self
    }

    /// Drop connections that stay silent this long (`None` waits forever)
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn bind<A: ToSocketAddrs>(self, addr: A) -> Result<ResponderServer> {
        let tls = self.tls.build()?;
        let listener = TcpListener::bind(addr)?;
        tracing::info!(addr = %listener.local_addr()?, "responder listening");

        Ok(ResponderServer {
            listener,
            tls,
            idle_timeout: self.idle_timeout,
        })
    }
}

impl Default for ResponderServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ResponderServer {
    listener: TcpListener,
    tls: TlsConfig,
    idle_timeout: Option<Duration>,
}

impl ResponderServer {
    pub fn builder() -> ResponderServerBuilder {
        ResponderServerBuilder::new()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve a single connection on the calling thread
    pub fn serve_one(&self) -> Result<()> {
        let (tcp_stream, peer) = self.listener.accept()?;
        handle_connection(tcp_stream, peer, &self.tls, self.idle_timeout)
    }

    /// Accept connections forever, one thread per connection
    pub fn run(&self) -> Result<()> {
        for incoming in self.listener.incoming() {
            let tcp_stream = match incoming {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            };
            // A client that reset while queued has no peer address
            let peer = match tcp_stream.peer_addr() {
                Ok(peer) => peer,
                Err(e) => {
                    tracing::warn!("dropping connection before serving it: {}", e);
                    continue;
                }
            };
            let tls = self.tls.clone();
            let idle_timeout = self.idle_timeout;

            thread::spawn(move || {
                if let Err(e) = handle_connection(tcp_stream, peer, &tls, idle_timeout) {
                    tracing::warn!(%peer, "connection ended with error: {}", e);
                }
            });
        }
        Ok(())
    }
}

fn handle_connection(
    tcp_stream: TcpStream,
    peer: SocketAddr,
    tls: &TlsConfig,
    idle_timeout: Option<Duration>,
) -> Result<()> {
    tcp_stream.set_read_timeout(idle_timeout)?;
    let mut session = tls.accept(tcp_stream)?;

    let alpn = session.alpn_protocol().map(str::to_string);
    tracing::info!(%peer, alpn = ?alpn, version = %session.info().version, "accepted");

    if alpn.as_deref() != Some(ALPN_H2) {
        tracing::info!(%peer, "no h2 negotiated, closing");
        session.close()?;
        return Ok(());
    }

    let result = drive(&mut session, &mut H2Session::new());

    let closed = session.close();
    tracing::info!(%peer, "connection closed");
    result?;
    closed?;
    Ok(())
}

/// Pump bytes between `stream` and `h2` until EOF, GOAWAY or an error
fn drive<S: Read + Write>(stream: &mut S, h2: &mut H2Session) -> Result<()> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::from_read(e, "waiting for client")),
        };

        let processed = h2.on_data(&buf[..n]);

        // Flush whatever the session queued, GOAWAY included, before
        // acting on an error
        let output = h2.take_output();
        if !output.is_empty() {
            stream.write_all(&output)?;
            stream.flush()?;
        }

        processed?;
        if h2.is_closing() {
            return Ok(());
        }
    }
}
