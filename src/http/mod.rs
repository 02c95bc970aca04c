//! HTTP transport pieces
//!
//! - `tls`: OpenSSL client/server sessions with ALPN
//! - `h2`: HTTP/2 frame codec, the probe request, and a minimal responder

pub mod h2;
pub mod tls;
