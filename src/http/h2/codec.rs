//! HTTP/2 frame encoding and decoding
//!
//! This module provides low-level frame encoding/decoding with full control
//! over frame construction, plus a reassembling decoder that turns an
//! arbitrary sequence of reads into whole frames.

use super::error::ErrorCode;
use super::frames::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Maximum frame payload size representable in the 24-bit length field
pub const MAX_FRAME_SIZE: usize = 0x00FFFFFF;

/// Frame codec for encoding/decoding HTTP/2 frames
///
/// Bytes are pushed in as they arrive from the wire; complete frames are
/// pulled out with [`FrameCodec::next_frame`]. A frame split across several
/// reads is held back until its payload is complete.
pub struct FrameCodec {
    /// Buffer for reading
    read_buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        FrameCodec {
            read_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Encode a frame header
    pub fn encode_header(header: &FrameHeader) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        let length = header.length as usize;

        // Length (24 bits, big-endian)
        bytes[0] = ((length >> 16) & 0xFF) as u8;
        bytes[1] = ((length >> 8) & 0xFF) as u8;
        bytes[2] = (length & 0xFF) as u8;

        bytes[3] = header.frame_type;
        bytes[4] = header.flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        let stream_id = header.stream_id & 0x7FFFFFFF;
        bytes[5..9].copy_from_slice(&stream_id.to_be_bytes());

        bytes
    }

    /// Decode a frame header from bytes
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
        let length = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);

        // Stream ID (31 bits, ignore reserved bit)
        let stream_id = ((bytes[5] as u32 & 0x7F) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        FrameHeader {
            length,
            frame_type: bytes[3],
            flags: FrameFlags::from_u8(bytes[4]),
            stream_id,
        }
    }

    /// Encode a whole frame (header followed by payload)
    pub fn encode_frame(frame: &Frame) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
        buf.put_slice(&Self::encode_header(&frame.header));
        buf.put_slice(&frame.payload);
        buf.freeze()
    }

    /// Encode a SETTINGS frame from (identifier, value) pairs
    pub fn encode_settings_frame(params: &[(u16, u32)], ack: bool) -> Bytes {
        let mut payload = BytesMut::with_capacity(params.len() * 6);
        if !ack {
            for (id, value) in params {
                payload.put_u16(*id);
                payload.put_u32(*value);
            }
        }
        let flags = if ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };
        // Stream ID must be 0 for SETTINGS
        Self::encode_frame(&Frame::new(FrameType::Settings, flags, 0, payload.freeze()))
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(data: [u8; 8], ack: bool) -> Bytes {
        let flags = if ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };
        Self::encode_frame(&Frame::new(
            FrameType::Ping,
            flags,
            0,
            Bytes::copy_from_slice(&data),
        ))
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(last_stream_id: u32, error_code: ErrorCode, debug_data: &[u8]) -> Bytes {
        let mut payload = BytesMut::with_capacity(8 + debug_data.len());
        payload.put_u32(last_stream_id & 0x7FFFFFFF);
        payload.put_u32(error_code.as_u32());
        payload.put_slice(debug_data);
        Self::encode_frame(&Frame::new(
            FrameType::Goaway,
            FrameFlags::empty(),
            0,
            payload.freeze(),
        ))
    }

    /// Append received bytes to the read buffer
    pub fn push(&mut self, chunk: &[u8]) {
        self.read_buffer.extend_from_slice(chunk);
    }

    /// Take the next complete frame out of the read buffer, if one is there
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.read_buffer.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
        header_bytes.copy_from_slice(&self.read_buffer[..FRAME_HEADER_SIZE]);
        let header = Self::decode_header(&header_bytes);

        let total = FRAME_HEADER_SIZE + header.length as usize;
        if self.read_buffer.len() < total {
            return None;
        }

        self.read_buffer.advance(FRAME_HEADER_SIZE);
        let payload = self.read_buffer.split_to(header.length as usize).freeze();
        Some(Frame { header, payload })
    }

    /// Drain every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Take raw bytes off the front of the buffer (e.g. a connection preface)
    ///
    /// Returns `None` until `len` bytes have been buffered.
    pub fn take_prefix(&mut self, len: usize) -> Option<Bytes> {
        if self.read_buffer.len() < len {
            return None;
        }
        Some(self.read_buffer.split_to(len).freeze())
    }

    /// Number of bytes buffered but not yet returned as frames
    pub fn buffered(&self) -> usize {
        self.read_buffer.len()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
