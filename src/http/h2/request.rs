//! The byte sequence a probe opens an HTTP/2 connection with
//!
//! A probe request is the connection preface, an empty SETTINGS frame and a
//! single HEADERS frame on stream 1 with END_STREAM and END_HEADERS set. By
//! default the HEADERS frame is the minimal fixed one whose header block is
//! the single HPACK byte `0x82` (static table index 2, `:method: GET`).

use super::codec::FrameCodec;
use super::error::{Error, Result};
use super::frames::{Frame, FrameFlags, FrameType};
use super::{CONNECTION_PREFACE, DEFAULT_MAX_FRAME_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// The fixed HEADERS frame sent when no header list is configured
pub const FIXED_HEADERS_FRAME: [u8; 10] = [0x00, 0x00, 0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x01, 0x82];

/// HPACK representation of `:method: GET` (indexed, static table entry 2)
const INDEXED_METHOD_GET: u8 = 0x82;

/// Stream the probe request is sent on
pub const PROBE_STREAM_ID: u32 = 1;

/// Header block carried by the probe's HEADERS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderBlock {
    /// The single byte `0x82`
    Fixed,
    /// A header list encoded with HPACK at build time
    List(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct ProbeRequest {
    headers: HeaderBlock,
}

impl ProbeRequest {
    /// The request with the fixed HEADERS frame
    pub fn fixed() -> Self {
        ProbeRequest {
            headers: HeaderBlock::Fixed,
        }
    }

    /// A request whose HEADERS frame carries the given header list
    pub fn with_headers(headers: Vec<(String, String)>) -> Self {
        ProbeRequest {
            headers: HeaderBlock::List(headers),
        }
    }

    pub fn header_block(&self) -> &HeaderBlock {
        &self.headers
    }

    /// Build the HEADERS frame
    pub fn headers_frame(&self) -> Result<Frame> {
        let block = match &self.headers {
            HeaderBlock::Fixed => Bytes::from_static(&[INDEXED_METHOD_GET]),
            HeaderBlock::List(list) => {
                let mut encoder = hpack::Encoder::new();
                let block = encoder.encode(
                    list.iter()
                        .map(|(name, value)| (name.as_bytes(), value.as_bytes())),
                );
                if block.len() > DEFAULT_MAX_FRAME_SIZE as usize {
                    return Err(Error::FrameSize(format!(
                        "header block of {} bytes does not fit a single HEADERS frame",
                        block.len()
                    )));
                }
                Bytes::from(block)
            }
        };

        let flags = FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        Ok(Frame::new(FrameType::Headers, flags, PROBE_STREAM_ID, block))
    }

    /// Preface + SETTINGS + HEADERS, ready for a single write
    pub fn to_bytes(&self) -> Result<Bytes> {
        let headers = FrameCodec::encode_frame(&self.headers_frame()?);
        let settings = FrameCodec::encode_settings_frame(&[], false);

        let mut buf = BytesMut::with_capacity(CONNECTION_PREFACE.len() + settings.len() + headers.len());
        buf.put_slice(CONNECTION_PREFACE);
        buf.put_slice(&settings);
        buf.put_slice(&headers);
        Ok(buf.freeze())
    }
}

impl Default for ProbeRequest {
    fn default() -> Self {
        Self::fixed()
    }
}
