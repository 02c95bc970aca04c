//! Crate-level errors

use crate::http::h2;
use crate::http::tls::TlsError;

/// Result type for probe and server operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("HTTP/2 error: {0}")]
    H2(#[from] h2::Error),

    #[error("Cannot resolve {0}")]
    Resolve(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timed out {0}")]
    Timeout(String),
}

impl Error {
    /// Map an I/O error from a blocking read, naming what timed out
    pub(crate) fn from_read(e: std::io::Error, what: &str) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                Error::Timeout(what.to_string())
            }
            _ => Error::Io(e),
        }
    }
}
