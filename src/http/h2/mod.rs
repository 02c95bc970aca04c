//! HTTP/2 wire protocol pieces
//!
//! This module provides just enough HTTP/2 to open a connection by hand and
//! read back what the peer sends:
//!
//! - **Frames**: the 9-byte header, frame types and flags
//! - **Codec**: header encode/decode and a decoder that reassembles frames
//!   split across reads
//! - **Request**: the preface + SETTINGS + HEADERS sequence a probe sends
//! - **Session / server**: a minimal responder that answers that request
//!
//! There is no stream multiplexing and no flow control.
//!
//! # Examples
//!
//! ```
//! use h2probe::http::h2::{FrameCodec, ProbeRequest, FrameType};
//!
//! let bytes = ProbeRequest::fixed().to_bytes().unwrap();
//! assert!(bytes.starts_with(h2probe::http::h2::CONNECTION_PREFACE));
//!
//! let mut codec = FrameCodec::new();
//! codec.push(&bytes[h2probe::http::h2::CONNECTION_PREFACE.len()..]);
//! let frames = codec.drain_frames();
//! assert_eq!(frames[0].kind(), Some(FrameType::Settings));
//! assert_eq!(frames[1].kind(), Some(FrameType::Headers));
//! ```

pub mod codec;
pub mod error;
pub mod frames;
pub mod request;
pub mod server;
pub mod session;
pub mod settings;

pub use codec::{FrameCodec, FRAME_HEADER_SIZE};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameFlags, FrameHeader, FrameType};
pub use request::{HeaderBlock, ProbeRequest};
pub use server::{ResponderServer, ResponderServerBuilder};
pub use session::{H2Session, StreamState};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// ALPN protocol identifier for HTTP/2 over TLS
pub const ALPN_H2: &str = "h2";

/// ALPN protocol identifier for HTTP/1.1
pub const ALPN_HTTP11: &str = "http/1.1";

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
