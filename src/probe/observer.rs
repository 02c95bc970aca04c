//! Progress callbacks for a probe run
//!
//! `Prober` reports each step to a [`ProbeObserver`]. The console observer
//! prints the human readable report; tests use [`NoopObserver`] or their
//! own recorders.

use super::ProbeOutcome;
use crate::http::h2::settings::{describe_settings, parse_settings};
use crate::http::h2::{ErrorCode, Frame, FrameType};
use crate::http::tls::TlsInfo;
use std::fmt::Write as _;
use std::io::Write;
use std::net::SocketAddr;

/// Receives probe progress. Every method defaults to doing nothing.
pub trait ProbeObserver {
    fn connected(&mut self, _peer: SocketAddr, _tls: &TlsInfo) {}

    fn alpn_selected(&mut self, _protocol: Option<&str>) {}

    fn request_sent(&mut self, _bytes: &[u8]) {}

    /// One successful read, before any frame parsing
    fn chunk_received(&mut self, _chunk: &[u8]) {}

    fn frame_received(&mut self, _frame: &Frame) {}

    /// Response header list decoded from a HEADERS frame
    fn headers_decoded(&mut self, _stream_id: u32, _headers: &[(String, String)]) {}

    fn finished(&mut self, _outcome: &ProbeOutcome) {}
}

/// Ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProbeObserver for NoopObserver {}

/// Prints the probe report line by line
pub struct ConsoleObserver<W: Write> {
    out: W,
}

impl ConsoleObserver<std::io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleObserver::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        ConsoleObserver { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // The report is best effort; a closed stdout must not abort the probe
    fn line(&mut self, text: impl AsRef<str>) {
        if let Err(e) = writeln!(self.out, "{}", text.as_ref()) {
            tracing::debug!("report output failed: {}", e);
        }
    }
}

impl<W: Write> ProbeObserver for ConsoleObserver<W> {
    fn connected(&mut self, peer: SocketAddr, tls: &TlsInfo) {
        self.line(format!("Connected to {}", peer));
        self.line(format!("TLS: {} {}", tls.version, tls.cipher));
        if let Some(cert) = &tls.peer_cert {
            self.line(format!("Certificate: {}", cert));
        }
    }

    fn alpn_selected(&mut self, protocol: Option<&str>) {
        self.line(format!("Selected ALPN Protocol: {}", protocol.unwrap_or("None")));
        if protocol == Some("h2") {
            self.line("Success! ALPN negotiated h2.");
        }
    }

    fn request_sent(&mut self, _bytes: &[u8]) {
        self.line("Sent Preface + SETTINGS + HEADERS frames");
    }

    fn chunk_received(&mut self, chunk: &[u8]) {
        self.line(format!("Received {} bytes", chunk.len()));
        self.line(format!("Hex: {}", to_hex(chunk)));
    }

    fn frame_received(&mut self, frame: &Frame) {
        let header = &frame.header;
        self.line(format!(
            "Frame Type: {}, Length: {}, Flags: {}, Stream ID: {}",
            header.frame_type,
            header.length,
            header.flags.as_u8(),
            header.stream_id
        ));

        match frame.kind() {
            Some(FrameType::Data) => {
                let payload = frame.data().unwrap_or(&frame.payload[..]);
                self.line(format!("DATA Payload: {}", String::from_utf8_lossy(payload)));
            }
            Some(FrameType::Settings) if !frame.flags().is_ack() => {
                if let Ok(params) = parse_settings(&frame.payload) {
                    if !params.is_empty() {
                        self.line(format!("  Settings: {}", describe_settings(&params)));
                    }
                }
            }
            Some(FrameType::RstStream) if frame.payload.len() >= 4 => {
                let code = read_u32(&frame.payload[..4]);
                self.line(format!("  RST_STREAM: {}", ErrorCode::describe(code)));
            }
            Some(FrameType::Goaway) if frame.payload.len() >= 8 => {
                let last_stream = read_u32(&frame.payload[..4]) & 0x7FFF_FFFF;
                let code = read_u32(&frame.payload[4..8]);
                let mut text = format!(
                    "  GOAWAY: last stream {}, {}",
                    last_stream,
                    ErrorCode::describe(code)
                );
                if frame.payload.len() > 8 {
                    let _ = write!(text, ", {}", String::from_utf8_lossy(&frame.payload[8..]));
                }
                self.line(text);
            }
            _ => {}
        }
    }

    fn headers_decoded(&mut self, _stream_id: u32, headers: &[(String, String)]) {
        for (name, value) in headers {
            self.line(format!("  {}: {}", name, value));
        }
    }

    fn finished(&mut self, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Passed => self.line("Test Passed: Received expected data!"),
            ProbeOutcome::AlpnMismatch(_) => self.line("Failed: ALPN did not select h2."),
            ProbeOutcome::ClosedWithoutMarker => {
                self.line("Connection closed before the expected data arrived.")
            }
        }
        let _ = self.out.flush();
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Lowercase hex without separators
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::{FrameCodec, FrameFlags};
    use bytes::Bytes;

    fn output(observer: ConsoleObserver<Vec<u8>>) -> String {
        String::from_utf8(observer.into_inner()).unwrap()
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0x01, 0xab, 0xff]), "0001abff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_alpn_lines() {
        let mut observer = ConsoleObserver::new(Vec::new());
        observer.alpn_selected(Some("h2"));
        observer.alpn_selected(None);
        assert_eq!(
            output(observer),
            "Selected ALPN Protocol: h2\nSuccess! ALPN negotiated h2.\nSelected ALPN Protocol: None\n"
        );
    }

    #[test]
    fn test_chunk_and_data_frame_lines() {
        let mut observer = ConsoleObserver::new(Vec::new());
        let mut flags = FrameFlags::empty();
        flags.set(FrameFlags::END_STREAM);
        let frame = Frame::new(FrameType::Data, flags, 1, Bytes::from_static(b"Hello"));
        let wire = FrameCodec::encode_frame(&frame);

        observer.chunk_received(&wire);
        observer.frame_received(&frame);

        assert_eq!(
            output(observer),
            "Received 14 bytes\n\
             Hex: 00000500010000000148656c6c6f\n\
             Frame Type: 0, Length: 5, Flags: 1, Stream ID: 1\n\
             DATA Payload: Hello\n"
        );
    }

    #[test]
    fn test_goaway_details() {
        let mut observer = ConsoleObserver::new(Vec::new());
        let wire = FrameCodec::encode_goaway_frame(3, ErrorCode::ProtocolError, b"bad");
        let mut codec = FrameCodec::new();
        codec.push(&wire);
        let frame = codec.next_frame().unwrap();

        observer.frame_received(&frame);
        let text = output(observer);
        assert!(text.starts_with("Frame Type: 7, Length: 11, Flags: 0, Stream ID: 0\n"));
        assert!(text.contains("GOAWAY: last stream 3, PROTOCOL_ERROR (0x1), bad"));
    }

    #[test]
    fn test_finished_lines() {
        let mut observer = ConsoleObserver::new(Vec::new());
        observer.finished(&ProbeOutcome::Passed);
        observer.finished(&ProbeOutcome::AlpnMismatch(Some("http/1.1".to_string())));
        assert_eq!(
            output(observer),
            "Test Passed: Received expected data!\nFailed: ALPN did not select h2.\n"
        );
    }
}
