//! The HTTP/2 ALPN probe
//!
//! A [`Prober`] connects over TLS offering the configured ALPN protocols,
//! and when the server picks `h2` sends the probe request and reads until
//! the marker shows up or the peer closes. Every step is reported to a
//! [`ProbeObserver`]; the returned [`ProbeReport`] carries the same facts
//! for programmatic use.
//!
//! # Examples
//!
//! ```no_run
//! use h2probe::probe::{ConsoleObserver, ProbeConfig, Prober};
//!
//! let config = ProbeConfig::builder().host("localhost").port(8443).build()?;
//! let report = Prober::new(config).run(&mut ConsoleObserver::stdout())?;
//! std::process::exit(report.outcome.exit_code());
//! # Ok::<(), h2probe::Error>(())
//! ```

pub mod config;
pub mod marker;
pub mod observer;

pub use config::{ProbeConfig, ProbeConfigBuilder};
pub use marker::MarkerSearch;
pub use observer::{ConsoleObserver, NoopObserver, ProbeObserver};

use crate::http::h2::{Frame, FrameCodec, FrameHeader, FrameType, ALPN_H2};
use crate::http::tls::TlsInfo;
use crate::{net, Error, Result};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// How a probe run ended, when it ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The marker arrived
    Passed,
    /// The server selected something other than `h2` (or nothing)
    AlpnMismatch(Option<String>),
    /// The peer closed the connection before the marker arrived
    ClosedWithoutMarker,
}

impl ProbeOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, ProbeOutcome::Passed)
    }

    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            ProbeOutcome::Passed => 0,
            ProbeOutcome::AlpnMismatch(_) | ProbeOutcome::ClosedWithoutMarker => 1,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Passed => write!(f, "passed"),
            ProbeOutcome::AlpnMismatch(Some(p)) => write!(f, "ALPN selected {}", p),
            ProbeOutcome::AlpnMismatch(None) => write!(f, "no ALPN protocol selected"),
            ProbeOutcome::ClosedWithoutMarker => write!(f, "closed without marker"),
        }
    }
}

/// What happened after the request was sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeReport {
    pub bytes_sent: usize,
    pub bytes_received: usize,
    /// Number of successful reads
    pub chunks: usize,
    /// Headers of every complete frame received, in order
    pub frames: Vec<FrameHeader>,
    /// Concatenated DATA payloads (padding stripped)
    pub data: Vec<u8>,
    /// Header lists decoded from HEADERS frames
    pub response_headers: Vec<(String, String)>,
    pub marker_found: bool,
    /// Trailing bytes that never formed a complete frame
    pub unparsed_bytes: usize,
}

impl ExchangeReport {
    pub fn data_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// First value of a decoded response header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub peer: SocketAddr,
    pub tls: TlsInfo,
    /// `None` when ALPN did not select `h2` and nothing was sent
    pub exchange: Option<ExchangeReport>,
    pub outcome: ProbeOutcome,
}

/// Runs one probe against one server
#[derive(Debug, Clone)]
pub struct Prober {
    config: ProbeConfig,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Self {
        Prober { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Connect, negotiate, exchange and close
    ///
    /// Errors from any step are returned after the TLS session, if one was
    /// established, has been closed.
    pub fn run<O: ProbeObserver + ?Sized>(&self, observer: &mut O) -> Result<ProbeReport> {
        let config = &self.config;
        let tls = config.tls_config()?;

        let tcp_stream = net::connect(
            &config.host,
            config.port,
            config.connect_timeout,
            config.read_timeout,
        )?;
        let peer = tcp_stream.peer_addr()?;
        tracing::info!(%peer, servername = config.servername(), "connected");

        let mut session = tls.connect(tcp_stream)?;
        let info = session.info().clone();
        observer.connected(peer, &info);

        let alpn = info.alpn.clone();
        observer.alpn_selected(alpn.as_deref());

        let result = if alpn.as_deref() == Some(ALPN_H2) {
            self.exchange(&mut session, observer).map(|exchange| {
                let outcome = if exchange.marker_found {
                    ProbeOutcome::Passed
                } else {
                    ProbeOutcome::ClosedWithoutMarker
                };
                (Some(exchange), outcome)
            })
        } else {
            tracing::warn!(alpn = ?alpn, "server did not select h2");
            Ok((None, ProbeOutcome::AlpnMismatch(alpn)))
        };

        if let Err(e) = session.close() {
            tracing::debug!("close failed: {}", e);
        }
        let (exchange, outcome) = result?;

        tracing::info!(%outcome, "probe finished");
        observer.finished(&outcome);

        Ok(ProbeReport {
            peer,
            tls: info,
            exchange,
            outcome,
        })
    }

    /// Send the request over `stream` and read until the marker or EOF
    pub fn exchange<S, O>(&self, stream: &mut S, observer: &mut O) -> Result<ExchangeReport>
    where
        S: Read + Write,
        O: ProbeObserver + ?Sized,
    {
        let request = self.config.request.to_bytes()?;
        stream.write_all(&request)?;
        stream.flush()?;
        observer.request_sent(&request);
        tracing::debug!(bytes = request.len(), "request sent");

        let mut report = ExchangeReport {
            bytes_sent: request.len(),
            ..ExchangeReport::default()
        };
        let mut codec = FrameCodec::new();
        let mut decoder = hpack::Decoder::new();
        let mut marker = MarkerSearch::new(self.config.marker.clone());
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("peer closed the connection");
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_read(e, "waiting for response")),
            };

            let chunk = &buf[..n];
            report.bytes_received += n;
            report.chunks += 1;
            observer.chunk_received(chunk);

            codec.push(chunk);
            while let Some(frame) = codec.next_frame() {
                record_frame(&frame, &mut decoder, &mut report, observer);
            }

            if marker.feed(chunk) {
                report.marker_found = true;
                break;
            }
        }

        report.unparsed_bytes = codec.buffered();
        if report.unparsed_bytes > 0 {
            tracing::debug!(bytes = report.unparsed_bytes, "incomplete trailing frame");
        }
        Ok(report)
    }
}

fn record_frame<O: ProbeObserver + ?Sized>(
    frame: &Frame,
    decoder: &mut hpack::Decoder<'static>,
    report: &mut ExchangeReport,
    observer: &mut O,
) {
    tracing::debug!(
        frame_type = %frame.header.type_name(),
        length = frame.header.length,
        flags = frame.flags().as_u8(),
        stream_id = frame.stream_id(),
        "frame"
    );
    report.frames.push(frame.header);
    observer.frame_received(frame);

    match frame.kind() {
        Some(FrameType::Data) => match frame.data() {
            Some(data) => report.data.extend_from_slice(data),
            None => tracing::warn!(stream_id = frame.stream_id(), "DATA padding exceeds payload"),
        },
        Some(FrameType::Headers) => {
            if !frame.flags().is_end_headers() {
                tracing::warn!(
                    stream_id = frame.stream_id(),
                    "header block continues in CONTINUATION frames, not decoded"
                );
                return;
            }
            let Some(block) = frame.header_block() else {
                tracing::warn!(stream_id = frame.stream_id(), "malformed HEADERS padding");
                return;
            };
            match decoder.decode(block) {
                Ok(list) => {
                    let headers: Vec<(String, String)> = list
                        .into_iter()
                        .map(|(name, value)| {
                            (
                                String::from_utf8_lossy(&name).into_owned(),
                                String::from_utf8_lossy(&value).into_owned(),
                            )
                        })
                        .collect();
                    observer.headers_decoded(frame.stream_id(), &headers);
                    report.response_headers.extend(headers);
                }
                Err(e) => tracing::warn!("HPACK decoding failed: {:?}", e),
            }
        }
        _ => {}
    }
}
