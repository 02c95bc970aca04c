//! End-to-end probe runs over TLS on loopback
//!
//! - probe against the bundled responder (passes)
//! - responder that only speaks http/1.1 (ALPN mismatch)
//! - peer that sends SETTINGS and hangs up (closed without marker)
//! - peer that never answers (read timeout)
//! - certificate verification against a CA file, by name and by address
//! - certificate files
//! - a responder that keeps accepting after a client resets

use h2probe::http::h2::{FrameCodec, FrameType, ResponderServer, CONNECTION_PREFACE};
use h2probe::http::tls::builtin_cert::BUILTIN_CERT;
use h2probe::http::tls::TlsConfig;
use h2probe::probe::{NoopObserver, ProbeConfig, ProbeConfigBuilder, ProbeOutcome, Prober};
use h2probe::Error;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

fn probe_config(addr: SocketAddr) -> ProbeConfigBuilder {
    ProbeConfig::builder()
        .host("127.0.0.1")
        .servername("localhost")
        .port(addr.port())
        .read_timeout(Some(Duration::from_secs(5)))
}

/// Responder serving exactly one connection on a background thread
fn spawn_responder(alpn: &'static [&'static str]) -> (SocketAddr, thread::JoinHandle<()>) {
    let server = ResponderServer::builder()
        .alpn(alpn)
        .bind("127.0.0.1:0")
        .unwrap();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let _ = server.serve_one();
    });
    (addr, handle)
}

#[test]
fn test_probe_passes_against_responder() {
    let (addr, server) = spawn_responder(&["h2", "http/1.1"]);
    let config = probe_config(addr).build().unwrap();

    let report = Prober::new(config).run(&mut NoopObserver).unwrap();

    assert_eq!(report.outcome, ProbeOutcome::Passed);
    assert_eq!(report.tls.alpn(), Some("h2"));
    assert_eq!(report.peer, addr);

    let exchange = report.exchange.unwrap();
    assert!(exchange.marker_found);
    assert_eq!(exchange.bytes_sent, CONNECTION_PREFACE.len() + 9 + 10);
    assert!(exchange.data_lossy().contains("Hello from HTTP/2 Stream 1"));
    assert_eq!(exchange.header(":status"), Some("200"));
    assert_eq!(exchange.header("server"), Some("h2probe"));
    assert_eq!(exchange.frames[0].kind(), Some(FrameType::Settings));
    assert!(exchange
        .frames
        .iter()
        .any(|h| h.kind() == Some(FrameType::Data) && h.flags.is_end_stream()));

    server.join().unwrap();
}

#[test]
fn test_probe_with_hpack_request() {
    let (addr, server) = spawn_responder(&["h2"]);
    let config = probe_config(addr)
        .request_headers(vec![
            (":method".to_string(), "GET".to_string()),
            (":scheme".to_string(), "https".to_string()),
            (":path".to_string(), "/".to_string()),
            (":authority".to_string(), "localhost".to_string()),
        ])
        .build()
        .unwrap();

    let report = Prober::new(config).run(&mut NoopObserver).unwrap();
    assert!(report.outcome.is_passed());
    server.join().unwrap();
}

#[test]
fn test_probe_alpn_mismatch() {
    let (addr, server) = spawn_responder(&["http/1.1"]);
    let config = probe_config(addr).build().unwrap();

    let report = Prober::new(config).run(&mut NoopObserver).unwrap();

    assert_eq!(
        report.outcome,
        ProbeOutcome::AlpnMismatch(Some("http/1.1".to_string()))
    );
    assert_eq!(report.outcome.exit_code(), 1);
    assert!(report.exchange.is_none());
    server.join().unwrap();
}

#[test]
fn test_probe_no_alpn_selected() {
    let (addr, server) = spawn_responder(&["h2"]);
    let config = probe_config(addr).alpn(&["http/1.1"]).build().unwrap();

    let report = Prober::new(config).run(&mut NoopObserver).unwrap();

    assert_eq!(report.outcome, ProbeOutcome::AlpnMismatch(None));
    server.join().unwrap();
}

#[test]
fn test_probe_closed_without_marker() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        let tls_config = TlsConfig::server().alpn(&["h2"]).build().unwrap();
        let mut session = tls_config.accept(tcp_stream).unwrap();

        let mut request = [0u8; 43];
        session.read_exact(&mut request).unwrap();
        assert!(request.starts_with(CONNECTION_PREFACE));

        session
            .write_all(&FrameCodec::encode_settings_frame(&[(0x3, 100)], false))
            .unwrap();
        session.flush().unwrap();
        session.close().unwrap();
    });

    let config = probe_config(addr).build().unwrap();
    let report = Prober::new(config).run(&mut NoopObserver).unwrap();

    assert_eq!(report.outcome, ProbeOutcome::ClosedWithoutMarker);
    let exchange = report.exchange.unwrap();
    assert_eq!(exchange.frames.len(), 1);
    assert_eq!(exchange.frames[0].length, 6);
    server.join().unwrap();
}

#[test]
fn test_probe_read_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        let tls_config = TlsConfig::server().alpn(&["h2"]).build().unwrap();
        let mut session = tls_config.accept(tcp_stream).unwrap();
        // Swallow the request and stay silent
        let mut request = [0u8; 43];
        let _ = session.read_exact(&mut request);
        thread::sleep(Duration::from_millis(1500));
        let _ = session.close();
    });

    let config = probe_config(addr)
        .read_timeout(Some(Duration::from_millis(300)))
        .build()
        .unwrap();
    let result = Prober::new(config).run(&mut NoopObserver);

    assert!(matches!(result, Err(Error::Timeout(_))), "{:?}", result.err());
    server.join().unwrap();
}

#[test]
fn test_probe_verify_rejects_self_signed() {
    let (addr, server) = spawn_responder(&["h2"]);
    let config = probe_config(addr).verify_peer(true).build().unwrap();

    let result = Prober::new(config).run(&mut NoopObserver);

    assert!(matches!(result, Err(Error::Tls(_))));
    server.join().unwrap();
}

/// The built-in certificate (CN=example.com, no SANs) as a CA bundle
fn builtin_ca_file() -> tempfile::NamedTempFile {
    let mut pem = tempfile::NamedTempFile::new().unwrap();
    pem.write_all(BUILTIN_CERT.as_bytes()).unwrap();
    pem
}

#[test]
fn test_verify_with_ca_file_passes() {
    let ca = builtin_ca_file();
    let (addr, server) = spawn_responder(&["h2"]);
    let config = probe_config(addr)
        .servername("example.com")
        .verify_peer(true)
        .ca_file(ca.path())
        .build()
        .unwrap();

    let report = Prober::new(config).run(&mut NoopObserver).unwrap();

    assert!(report.outcome.is_passed());
    assert_eq!(report.tls.peer_cert.unwrap().subject, "example.com");
    server.join().unwrap();
}

#[test]
fn test_verify_with_ca_file_rejects_wrong_name() {
    let ca = builtin_ca_file();
    let (addr, server) = spawn_responder(&["h2"]);
    let config = probe_config(addr)
        .servername("localhost")
        .verify_peer(true)
        .ca_file(ca.path())
        .build()
        .unwrap();

    let result = Prober::new(config).run(&mut NoopObserver);

    assert!(matches!(result, Err(Error::Tls(_))), "{:?}", result.err());
    server.join().unwrap();
}

#[test]
fn test_verify_with_ca_file_rejects_unnamed_address() {
    let ca = builtin_ca_file();
    let (addr, server) = spawn_responder(&["h2"]);
    // No servername: the certificate must name 127.0.0.1 itself
    let config = ProbeConfig::builder()
        .host("127.0.0.1")
        .port(addr.port())
        .read_timeout(Some(Duration::from_secs(5)))
        .verify_peer(true)
        .ca_file(ca.path())
        .build()
        .unwrap();

    let result = Prober::new(config).run(&mut NoopObserver);

    assert!(matches!(result, Err(Error::Tls(_))), "{:?}", result.err());
    server.join().unwrap();
}

#[test]
fn test_responder_survives_reset_client() {
    let server = ResponderServer::builder().bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();

    // Reset the connection while it still sits in the accept queue
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
    socket.set_linger(Some(Duration::ZERO)).unwrap();
    socket.connect(&SockAddr::from(addr)).unwrap();
    drop(socket);
    thread::sleep(Duration::from_millis(50));

    thread::spawn(move || {
        let _ = server.run();
    });

    let config = probe_config(addr).build().unwrap();
    let report = Prober::new(config).run(&mut NoopObserver).unwrap();
    assert!(report.outcome.is_passed());
}

#[test]
fn test_responder_with_cert_file() {
    let pem = builtin_ca_file();

    let server = ResponderServer::builder()
        .cert_file(pem.path())
        .unwrap()
        .bind("127.0.0.1:0")
        .unwrap();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let _ = server.serve_one();
    });

    let config = probe_config(addr).build().unwrap();
    let report = Prober::new(config).run(&mut NoopObserver).unwrap();

    assert!(report.outcome.is_passed());
    assert!(report.tls.peer_cert.is_some());
    handle.join().unwrap();
}

#[test]
fn test_probe_connection_refused() {
    // Bind then drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = ProbeConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .connect_timeout(Some(Duration::from_secs(1)))
        .build()
        .unwrap();

    let result = Prober::new(config).run(&mut NoopObserver);
    assert!(matches!(result, Err(Error::Io(_))));
}
