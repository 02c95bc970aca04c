//! TCP connection setup
//!
//! Resolution and connect go through `socket2` so the connect itself can be
//! bounded and socket options set before the stream is handed to TLS.

use crate::{Error, Result};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Resolve `host:port` to every address it names
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Resolve(format!("{}:{}: {}", host, port, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Resolve(format!("{}:{}: no addresses", host, port)));
    }
    Ok(addrs)
}

/// Connect a TCP socket to one address
pub fn connect_addr(addr: &SocketAddr, connect_timeout: Option<Duration>) -> Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
    let sock_addr = SockAddr::from(*addr);

    match connect_timeout {
        Some(timeout) => socket.connect_timeout(&sock_addr, timeout)?,
        None => socket.connect(&sock_addr)?,
    }
    socket.set_nodelay(true)?;

    Ok(socket.into())
}

/// Resolve `host` and connect to the first address that accepts
///
/// The read and write timeouts are set on the returned stream and therefore
/// also bound the TLS handshake.
pub fn connect(
    host: &str,
    port: u16,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in resolve(host, port)? {
        tracing::debug!(%addr, "connecting");
        match connect_addr(&addr, connect_timeout) {
            Ok(stream) => {
                stream.set_read_timeout(io_timeout)?;
                stream.set_write_timeout(io_timeout)?;
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, "connect failed: {}", e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Resolve(format!("{}:{}: no addresses", host, port))))
}
