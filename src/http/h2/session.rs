//! Server-side HTTP/2 session
//!
//! A sans-I/O responder: bytes read from the connection go in through
//! [`H2Session::on_data`], bytes to write come out of
//! [`H2Session::take_output`]. It answers every request with a short
//! `text/plain` body naming the stream, which is what the probe looks for.

use super::codec::FrameCodec;
use super::error::{Error, ErrorCode, Result};
use super::frames::{Frame, FrameFlags, FrameType};
use super::settings::{describe_settings, parse_settings};
use super::{CONNECTION_PREFACE, CONNECTION_STREAM_ID};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;

/// Value of the `server` response header
pub const SERVER_NAME: &str = "h2probe";

/// Largest header block accepted across HEADERS and CONTINUATION frames
pub const MAX_HEADER_BLOCK_SIZE: usize = 64 * 1024;

/// Stream states (RFC 7540 Section 5.1), reduced to what a responder sees
///
/// Closed streams are dropped from the session, so a finished or reset
/// stream has no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedRemote,
}

#[derive(Debug)]
struct Stream {
    state: StreamState,
    /// Header block fragments waiting for END_HEADERS
    header_block: BytesMut,
    recv_buffer: BytesMut,
}

impl Stream {
    fn new() -> Self {
        Stream {
            state: StreamState::Idle,
            header_block: BytesMut::new(),
            recv_buffer: BytesMut::new(),
        }
    }
}

pub struct H2Session {
    codec: FrameCodec,
    preface_received: bool,
    streams: HashMap<u32, Stream>,
    /// Stream whose header block is still open (CONTINUATION expected)
    continuing: Option<u32>,
    last_stream_id: u32,
    output: BytesMut,
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
    going_away: bool,
}

impl H2Session {
    pub fn new() -> Self {
        H2Session {
            codec: FrameCodec::new(),
            preface_received: false,
            streams: HashMap::new(),
            continuing: None,
            last_stream_id: 0,
            output: BytesMut::new(),
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(),
            going_away: false,
        }
    }

    /// Feed bytes received from the client
    ///
    /// On a connection error a GOAWAY is queued before the error is
    /// returned; callers should flush [`take_output`](Self::take_output)
    /// and then close.
    pub fn on_data(&mut self, data: &[u8]) -> Result<()> {
        self.codec.push(data);

        if !self.preface_received {
            let preface = match self.codec.take_prefix(CONNECTION_PREFACE.len()) {
                Some(preface) => preface,
                None => return Ok(()),
            };
            if &preface[..] != CONNECTION_PREFACE {
                self.go_away(ErrorCode::ProtocolError, b"invalid connection preface");
                return Err(Error::MissingPreface);
            }
            self.preface_received = true;
            tracing::debug!("connection preface received");
            self.send_settings();
        }

        while let Some(frame) = self.codec.next_frame() {
            if let Err(e) = self.process_frame(frame) {
                let code = match &e {
                    Error::FrameSize(_) => ErrorCode::FrameSizeError,
                    Error::Compression(_) => ErrorCode::CompressionError,
                    _ => ErrorCode::ProtocolError,
                };
                self.go_away(code, e.to_string().as_bytes());
                return Err(e);
            }
            if self.going_away {
                break;
            }
        }

        Ok(())
    }

    /// Bytes queued for the client since the last call
    pub fn take_output(&mut self) -> Bytes {
        self.output.split().freeze()
    }

    /// True once either side has sent GOAWAY
    pub fn is_closing(&self) -> bool {
        self.going_away
    }

    pub fn preface_received(&self) -> bool {
        self.preface_received
    }

    pub fn stream_state(&self, stream_id: u32) -> Option<StreamState> {
        self.streams.get(&stream_id).map(|s| s.state)
    }

    /// Request body bytes received on a stream
    pub fn request_body(&self, stream_id: u32) -> Option<&[u8]> {
        self.streams.get(&stream_id).map(|s| &s.recv_buffer[..])
    }

    fn send_settings(&mut self) {
        self.output.put_slice(&FrameCodec::encode_settings_frame(&[], false));
    }

    fn go_away(&mut self, code: ErrorCode, debug_data: &[u8]) {
        tracing::warn!(error = %code, "sending GOAWAY");
        self.output.put_slice(&FrameCodec::encode_goaway_frame(
            self.last_stream_id,
            code,
            debug_data,
        ));
        self.going_away = true;
    }

    fn process_frame(&mut self, frame: Frame) -> Result<()> {
        let header = frame.header;
        tracing::debug!(
            frame_type = %header.type_name(),
            length = header.length,
            flags = header.flags.as_u8(),
            stream = header.stream_id,
            "recv frame"
        );

        if let Some(expected) = self.continuing {
            if frame.kind() != Some(FrameType::Continuation) || header.stream_id != expected {
                return Err(Error::Protocol(format!(
                    "expected CONTINUATION on stream {}",
                    expected
                )));
            }
        }

        match frame.kind() {
            Some(FrameType::Data) => self.handle_data(&frame),
            Some(FrameType::Headers) => self.handle_headers(&frame),
            Some(FrameType::Continuation) => self.handle_continuation(&frame),
            Some(FrameType::Settings) => self.handle_settings(&frame),
            Some(FrameType::Ping) => self.handle_ping(&frame),
            Some(FrameType::RstStream) => self.handle_rst_stream(&frame),
            Some(FrameType::Goaway) => {
                self.handle_goaway(&frame);
                Ok(())
            }
            _ => {
                tracing::debug!(frame_type = header.frame_type, "ignored frame");
                Ok(())
            }
        }
    }

    fn handle_settings(&mut self, frame: &Frame) -> Result<()> {
        if frame.stream_id() != CONNECTION_STREAM_ID {
            return Err(Error::Protocol("SETTINGS on a non-zero stream".to_string()));
        }
        if frame.flags().is_ack() {
            if !frame.payload.is_empty() {
                return Err(Error::FrameSize("SETTINGS ACK with a payload".to_string()));
            }
            return Ok(());
        }

        let params = parse_settings(&frame.payload)?;
        if !params.is_empty() {
            tracing::debug!(settings = %describe_settings(&params), "peer settings");
        }
        self.output.put_slice(&FrameCodec::encode_settings_frame(&[], true));
        Ok(())
    }

    fn handle_ping(&mut self, frame: &Frame) -> Result<()> {
        if frame.payload.len() != 8 {
            return Err(Error::FrameSize(format!(
                "PING payload of {} bytes",
                frame.payload.len()
            )));
        }
        if frame.flags().is_ack() {
            return Ok(());
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(&frame.payload);
        self.output.put_slice(&FrameCodec::encode_ping_frame(data, true));
        Ok(())
    }

    fn handle_headers(&mut self, frame: &Frame) -> Result<()> {
        let stream_id = frame.stream_id();
        if stream_id == CONNECTION_STREAM_ID || stream_id % 2 == 0 {
            return Err(Error::Protocol(format!(
                "HEADERS on invalid client stream {}",
                stream_id
            )));
        }
        let block = frame
            .header_block()
            .ok_or_else(|| Error::Protocol("malformed HEADERS padding".to_string()))?;

        self.last_stream_id = self.last_stream_id.max(stream_id);
        let stream = self.streams.entry(stream_id).or_insert_with(Stream::new);
        stream.state = if frame.flags().is_end_stream() {
            StreamState::HalfClosedRemote
        } else {
            StreamState::Open
        };
        append_header_fragment(stream, stream_id, block)?;

        if frame.flags().is_end_headers() {
            self.finish_headers(stream_id)
        } else {
            self.continuing = Some(stream_id);
            Ok(())
        }
    }

    fn handle_continuation(&mut self, frame: &Frame) -> Result<()> {
        let stream_id = frame.stream_id();
        let stream = match self.streams.get_mut(&stream_id) {
            Some(stream) if self.continuing == Some(stream_id) => stream,
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected CONTINUATION on stream {}",
                    stream_id
                )))
            }
        };
        append_header_fragment(stream, stream_id, &frame.payload)?;

        if frame.flags().is_end_headers() {
            self.continuing = None;
            self.finish_headers(stream_id)
        } else {
            Ok(())
        }
    }

    fn finish_headers(&mut self, stream_id: u32) -> Result<()> {
        let block = match self.streams.get_mut(&stream_id) {
            Some(stream) => stream.header_block.split().freeze(),
            None => return Ok(()),
        };
        let headers = self
            .decoder
            .decode(&block)
            .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

        for (name, value) in &headers {
            tracing::debug!(
                stream = stream_id,
                "{}: {}",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value)
            );
        }

        self.send_simple_response(stream_id);
        Ok(())
    }

    fn handle_data(&mut self, frame: &Frame) -> Result<()> {
        let stream_id = frame.stream_id();
        if stream_id == CONNECTION_STREAM_ID {
            return Err(Error::Protocol("DATA on stream 0".to_string()));
        }
        let data = frame
            .data()
            .ok_or_else(|| Error::Protocol("malformed DATA padding".to_string()))?;

        let stream = self.streams.entry(stream_id).or_insert_with(Stream::new);
        stream.recv_buffer.put_slice(data);
        if frame.flags().is_end_stream() && stream.state == StreamState::Open {
            stream.state = StreamState::HalfClosedRemote;
        }
        Ok(())
    }

    fn handle_rst_stream(&mut self, frame: &Frame) -> Result<()> {
        if frame.payload.len() != 4 {
            return Err(Error::FrameSize(format!(
                "RST_STREAM payload of {} bytes",
                frame.payload.len()
            )));
        }
        let code = u32::from_be_bytes([
            frame.payload[0],
            frame.payload[1],
            frame.payload[2],
            frame.payload[3],
        ]);
        tracing::info!(stream = frame.stream_id(), error = %ErrorCode::describe(code), "RST_STREAM");

        self.streams.remove(&frame.stream_id());
        Ok(())
    }

    fn handle_goaway(&mut self, frame: &Frame) {
        if frame.payload.len() >= 8 {
            let code = u32::from_be_bytes([
                frame.payload[4],
                frame.payload[5],
                frame.payload[6],
                frame.payload[7],
            ]);
            tracing::info!(error = %ErrorCode::describe(code), "peer sent GOAWAY");
        }
        self.going_away = true;
    }

    fn send_simple_response(&mut self, stream_id: u32) {
        let body = format!("Hello from HTTP/2 Stream {}", stream_id);
        let content_length = body.len().to_string();

        let headers: [(&[u8], &[u8]); 4] = [
            (&b":status"[..], &b"200"[..]),
            (&b"content-type"[..], &b"text/plain"[..]),
            (&b"content-length"[..], content_length.as_bytes()),
            (&b"server"[..], SERVER_NAME.as_bytes()),
        ];
        let block = self.encoder.encode(headers.iter().copied());

        self.output.put_slice(&FrameCodec::encode_frame(&Frame::new(
            FrameType::Headers,
            FrameFlags::from_u8(FrameFlags::END_HEADERS),
            stream_id,
            Bytes::from(block),
        )));
        self.output.put_slice(&FrameCodec::encode_frame(&Frame::new(
            FrameType::Data,
            FrameFlags::from_u8(FrameFlags::END_STREAM),
            stream_id,
            Bytes::from(body),
        )));

        self.streams.remove(&stream_id);
        tracing::info!(stream = stream_id, "response sent");
    }
}

fn append_header_fragment(stream: &mut Stream, stream_id: u32, fragment: &[u8]) -> Result<()> {
    if stream.header_block.len() + fragment.len() > MAX_HEADER_BLOCK_SIZE {
        return Err(Error::Protocol(format!(
            "header block on stream {} exceeds {} bytes",
            stream_id, MAX_HEADER_BLOCK_SIZE
        )));
    }
    stream.header_block.put_slice(fragment);
    Ok(())
}

impl Default for H2Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::request::ProbeRequest;

    fn frames_of(bytes: &[u8]) -> Vec<Frame> {
        let mut codec = FrameCodec::new();
        codec.push(bytes);
        codec.drain_frames()
    }

    #[test]
    fn test_waits_for_full_preface() {
        let mut session = H2Session::new();
        session.on_data(&CONNECTION_PREFACE[..10]).unwrap();
        assert!(!session.preface_received());
        assert!(session.take_output().is_empty());

        session.on_data(&CONNECTION_PREFACE[10..]).unwrap();
        assert!(session.preface_received());

        // Our own SETTINGS goes out as soon as the preface is in
        let out = session.take_output();
        assert_eq!(&out[..], &[0, 0, 0, 4, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_bad_preface_gets_goaway() {
        let mut session = H2Session::new();
        let err = session.on_data(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::MissingPreface));
        assert!(session.is_closing());

        let frames = frames_of(&session.take_output());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), Some(FrameType::Goaway));
        assert_eq!(&frames[0].payload[4..8], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_fixed_request_gets_response() {
        let mut session = H2Session::new();
        session
            .on_data(&ProbeRequest::fixed().to_bytes().unwrap())
            .unwrap();

        let frames = frames_of(&session.take_output());
        let kinds: Vec<_> = frames.iter().map(|f| f.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                Some(FrameType::Settings),
                Some(FrameType::Settings),
                Some(FrameType::Headers),
                Some(FrameType::Data),
            ]
        );

        // Second SETTINGS acknowledges the client's
        assert!(frames[1].flags().is_ack());

        let mut decoder = hpack::Decoder::new();
        let headers = decoder.decode(&frames[2].payload).unwrap();
        assert_eq!(headers[0], (b":status".to_vec(), b"200".to_vec()));
        assert!(frames[2].flags().is_end_headers());

        assert_eq!(frames[3].data(), Some(&b"Hello from HTTP/2 Stream 1"[..]));
        assert!(frames[3].flags().is_end_stream());
        // Answered streams are dropped
        assert_eq!(session.stream_state(1), None);
    }

    #[test]
    fn test_ping_is_echoed() {
        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        session.take_output();

        session
            .on_data(&FrameCodec::encode_ping_frame([8, 7, 6, 5, 4, 3, 2, 1], false))
            .unwrap();
        let frames = frames_of(&session.take_output());
        assert_eq!(frames.len(), 1);
        assert!(frames[0].flags().is_ack());
        assert_eq!(&frames[0].payload[..], &[8, 7, 6, 5, 4, 3, 2, 1]);

        // An ACK is not answered
        session
            .on_data(&FrameCodec::encode_ping_frame([0; 8], true))
            .unwrap();
        assert!(session.take_output().is_empty());
    }

    #[test]
    fn test_headers_split_over_continuation() {
        let mut encoder = hpack::Encoder::new();
        let block = encoder.encode(vec![
            (&b":method"[..], &b"GET"[..]),
            (&b":path"[..], &b"/"[..]),
            (&b":scheme"[..], &b"https"[..]),
        ]);
        let (first, rest) = block.split_at(2);

        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        session.take_output();

        session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::Headers,
                FrameFlags::from_u8(FrameFlags::END_STREAM),
                3,
                Bytes::copy_from_slice(first),
            )))
            .unwrap();
        assert!(session.take_output().is_empty());
        assert_eq!(session.stream_state(3), Some(StreamState::HalfClosedRemote));

        session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::Continuation,
                FrameFlags::from_u8(FrameFlags::END_HEADERS),
                3,
                Bytes::copy_from_slice(rest),
            )))
            .unwrap();
        let frames = frames_of(&session.take_output());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].data(), Some(&b"Hello from HTTP/2 Stream 3"[..]));
    }

    #[test]
    fn test_unbounded_continuation_gets_goaway() {
        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        session.take_output();
        session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::Headers,
                FrameFlags::empty(),
                1,
                Bytes::from(vec![0u8; 16_384]),
            )))
            .unwrap();

        let fragment = FrameCodec::encode_frame(&Frame::new(
            FrameType::Continuation,
            FrameFlags::empty(),
            1,
            Bytes::from(vec![0u8; 16_384]),
        ));
        // Three more fragments reach the limit exactly; the fourth exceeds it
        for _ in 0..3 {
            session.on_data(&fragment).unwrap();
        }
        let err = session.on_data(&fragment).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(session.is_closing());

        let frames = frames_of(&session.take_output());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), Some(FrameType::Goaway));
        assert_eq!(&frames[0].payload[4..8], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_interleaved_frame_during_continuation_is_error() {
        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::Headers,
                FrameFlags::empty(),
                1,
                Bytes::from_static(&[0x82]),
            )))
            .unwrap();

        let err = session
            .on_data(&FrameCodec::encode_ping_frame([0; 8], false))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(session.is_closing());
    }

    #[test]
    fn test_request_body_buffered() {
        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::Data,
                FrameFlags::empty(),
                5,
                Bytes::from("abc"),
            )))
            .unwrap();
        assert_eq!(session.request_body(5), Some(&b"abc"[..]));
    }

    #[test]
    fn test_rst_stream_closes_stream() {
        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::Data,
                FrameFlags::empty(),
                7,
                Bytes::from("x"),
            )))
            .unwrap();
        session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::RstStream,
                FrameFlags::empty(),
                7,
                Bytes::from_static(&[0, 0, 0, 8]),
            )))
            .unwrap();
        assert_eq!(session.stream_state(7), None);
        assert_eq!(session.request_body(7), None);
    }

    #[test]
    fn test_peer_goaway_marks_closing() {
        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        session
            .on_data(&FrameCodec::encode_goaway_frame(0, ErrorCode::NoError, b""))
            .unwrap();
        assert!(session.is_closing());
    }

    #[test]
    fn test_settings_on_stream_is_protocol_error() {
        let mut session = H2Session::new();
        session.on_data(CONNECTION_PREFACE).unwrap();
        let err = session
            .on_data(&FrameCodec::encode_frame(&Frame::new(
                FrameType::Settings,
                FrameFlags::empty(),
                1,
                Bytes::new(),
            )))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
