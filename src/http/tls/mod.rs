//! TLS support
//!
//! Client and server TLS over blocking TCP sockets, built on OpenSSL.
//!
//! 1. `TlsConfig` defines TLS settings (versions, ALPN, SNI, verification,
//!    certificates)
//! 2. `TlsSession` performs the handshake and then behaves like any
//!    `Read + Write` stream
//! 3. `TlsInfo` records what was negotiated
//!
//! Peer verification is off unless asked for: the probe is pointed at test
//! servers with self-signed certificates far more often than not.
//!
//! # Examples
//!
//! ```no_run
//! use h2probe::http::tls::{TlsConfig, TlsVersion};
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
//!     .servername("localhost")
//!     .alpn(&["h2", "http/1.1"])
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("127.0.0.1:8080").unwrap();
//! let tls_session = tls_config.connect(tcp_stream).unwrap();
//! println!("ALPN: {:?}", tls_session.alpn_protocol());
//! ```

pub mod builtin_cert;
pub mod cert;
pub mod config;
pub mod info;
pub mod session;

pub use cert::CertInfo;
pub use config::{ClientConfigBuilder, ServerConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use info::TlsInfo;
pub use session::TlsSession;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
