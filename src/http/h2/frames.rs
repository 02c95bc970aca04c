//! HTTP/2 frame types and utilities
//!
//! This module defines the frame types specified in RFC 7540 Section 6 and the
//! 9-byte frame header that precedes every payload.

use bytes::Bytes;
use std::fmt;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// DATA frame (0x0) - Conveys arbitrary, variable-length sequences of octets
    Data = 0x0,
    /// HEADERS frame (0x1) - Opens a stream and carries header block fragment
    Headers = 0x1,
    /// PRIORITY frame (0x2) - Specifies sender-advised priority of a stream
    Priority = 0x2,
    /// RST_STREAM frame (0x3) - Allows immediate termination of a stream
    RstStream = 0x3,
    /// SETTINGS frame (0x4) - Conveys configuration parameters
    Settings = 0x4,
    /// PUSH_PROMISE frame (0x5) - Used to notify peer of intent to initiate stream
    PushPromise = 0x5,
    /// PING frame (0x6) - Mechanism for measuring round-trip time
    Ping = 0x6,
    /// GOAWAY frame (0x7) - Initiates shutdown of connection
    Goaway = 0x7,
    /// WINDOW_UPDATE frame (0x8) - Implements flow control
    WindowUpdate = 0x8,
    /// CONTINUATION frame (0x9) - Continues sequence of header block fragments
    Continuation = 0x9,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Check if a flag is set
    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// The 9-byte header in front of every frame (RFC 7540 Section 4.1)
///
/// The type is kept as the raw byte so that extension or garbage frame types
/// survive decoding and can still be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length (24 bits)
    pub length: u32,
    /// Raw frame type byte
    pub frame_type: u8,
    /// Frame flags
    pub flags: FrameFlags,
    /// Stream ID (31 bits, reserved bit cleared)
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn new(frame_type: FrameType, flags: FrameFlags, stream_id: u32, length: u32) -> Self {
        FrameHeader {
            length,
            frame_type: frame_type.as_u8(),
            flags,
            stream_id,
        }
    }

    /// Known frame type, if any
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// Human readable type name, falling back to the numeric value
    pub fn type_name(&self) -> String {
        match self.kind() {
            Some(kind) => kind.name().to_string(),
            None => format!("UNKNOWN(0x{:x})", self.frame_type),
        }
    }
}

/// A complete frame: header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame; the header length is taken from the payload
    pub fn new(frame_type: FrameType, flags: FrameFlags, stream_id: u32, payload: Bytes) -> Self {
        Frame {
            header: FrameHeader::new(frame_type, flags, stream_id, payload.len() as u32),
            payload,
        }
    }

    pub fn kind(&self) -> Option<FrameType> {
        self.header.kind()
    }

    pub fn stream_id(&self) -> u32 {
        self.header.stream_id
    }

    pub fn flags(&self) -> FrameFlags {
        self.header.flags
    }

    /// Get payload size
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Payload of a DATA frame with padding stripped
    ///
    /// Returns `None` for other frame types or when the pad length exceeds
    /// the payload.
    pub fn data(&self) -> Option<&[u8]> {
        if self.kind() != Some(FrameType::Data) {
            return None;
        }
        strip_padding(&self.payload, self.flags())
    }

    /// Header block fragment of a HEADERS frame with padding and priority
    /// fields stripped
    pub fn header_block(&self) -> Option<&[u8]> {
        if self.kind() != Some(FrameType::Headers) {
            return None;
        }
        let block = strip_padding(&self.payload, self.flags())?;
        if self.flags().is_priority() {
            // 4 byte stream dependency + 1 byte weight
            block.get(5..)
        } else {
            Some(block)
        }
    }
}

fn strip_padding(payload: &[u8], flags: FrameFlags) -> Option<&[u8]> {
    if !flags.is_padded() {
        return Some(payload);
    }
    let pad_len = *payload.first()? as usize;
    let body = &payload[1..];
    if pad_len > body.len() {
        return None;
    }
    Some(&body[..body.len() - pad_len])
}
