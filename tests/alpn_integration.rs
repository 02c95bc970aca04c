//! ALPN negotiation over real TLS on loopback
//!
//! Each test runs an OpenSSL server on an ephemeral port and checks which
//! protocol the client ends up with.

use h2probe::http::tls::{TlsConfig, TlsError, TlsSession, TlsVersion};
use std::net::{TcpListener, TcpStream};
use std::thread;

/// Accept one TLS connection with `server_alpn` and return what it selected
fn negotiate(server_alpn: &'static [&'static str], client_alpn: &[&str]) -> (Option<String>, Option<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        let tls_config = TlsConfig::server().alpn(server_alpn).build().unwrap();
        let mut session = tls_config.accept(tcp_stream).unwrap();
        let selected = session.alpn_protocol().map(str::to_string);
        session.close().unwrap();
        selected
    });

    let tls_config = TlsConfig::client()
        .servername("localhost")
        .alpn(client_alpn)
        .build()
        .unwrap();
    let tcp_stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut session = tls_config.connect(tcp_stream).unwrap();
    let client_selected = session.alpn_protocol().map(str::to_string);
    session.close().unwrap();

    (client_selected, server.join().unwrap())
}

#[test]
fn test_alpn_selects_h2() {
    let (client, server) = negotiate(&["h2", "http/1.1"], &["h2", "http/1.1"]);
    assert_eq!(client.as_deref(), Some("h2"));
    assert_eq!(server.as_deref(), Some("h2"));
}

#[test]
fn test_alpn_falls_back_to_http11() {
    let (client, _) = negotiate(&["http/1.1"], &["h2", "http/1.1"]);
    assert_eq!(client.as_deref(), Some("http/1.1"));
}

#[test]
fn test_alpn_client_order_wins() {
    let (client, _) = negotiate(&["h2", "http/1.1"], &["http/1.1", "h2"]);
    assert_eq!(client.as_deref(), Some("http/1.1"));
}

#[test]
fn test_alpn_no_overlap() {
    let (client, server) = negotiate(&["h2"], &["spdy/3"]);
    assert_eq!(client, None);
    assert_eq!(server, None);
}

#[test]
fn test_alpn_with_tls12() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (tcp_stream, _) = listener.accept().unwrap();
        let tls_config = TlsConfig::server()
            .version(TlsVersion::Tls12)
            .alpn(&["h2"])
            .build()
            .unwrap();
        let mut session = tls_config.accept(tcp_stream).unwrap();
        session.close().unwrap();
    });

    let tls_config = TlsConfig::client().alpn(&["h2"]).build().unwrap();
    let tcp_stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut session = TlsSession::connect(tcp_stream, &tls_config).unwrap();

    assert_eq!(session.info().version, "TLSv1.2");
    assert_eq!(session.info().alpn(), Some("h2"));
    session.close().unwrap();
    server.join().unwrap();
}

#[test]
fn test_alpn_protocol_too_long() {
    let long = "x".repeat(256);
    let result = TlsConfig::client().alpn(&[long.as_str()]).build();
    assert!(matches!(result, Err(TlsError::InvalidConfig(_))));
}
