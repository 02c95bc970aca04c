//! h2probe - HTTP/2 over TLS ALPN diagnostics
//!
//! Checks that a server negotiates `h2` through ALPN and answers a
//! hand-built HTTP/2 request, printing every frame it sends back. A small
//! responder is included so the probe can be exercised end to end.

pub mod error;
pub mod http;
pub mod logging;
pub mod net;
pub mod probe;

pub use error::{Error, Result};
