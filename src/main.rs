use anyhow::Context;
use clap::{Parser, Subcommand};
use h2probe::http::h2::{ResponderServer, ALPN_H2, ALPN_HTTP11};
use h2probe::http::tls::TlsVersion;
use h2probe::logging;
use h2probe::probe::{config, ConsoleObserver, ProbeConfig, Prober};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "h2probe")]
#[command(about = "Check HTTP/2 negotiation over TLS and dump the frames a server sends back")]
struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, negotiate h2, send a request and wait for the marker
    Probe(ProbeArgs),
    /// Run the HTTP/2 responder
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
struct ProbeArgs {
    #[arg(long, default_value = config::DEFAULT_HOST)]
    host: String,

    #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// SNI name (defaults to the host)
    #[arg(long)]
    servername: Option<String>,

    /// ALPN protocol to offer, repeatable, in preference order
    #[arg(long = "alpn", default_values_t = [ALPN_H2.to_string(), ALPN_HTTP11.to_string()])]
    alpn: Vec<String>,

    /// Verify the server certificate and host name
    #[arg(long)]
    verify: bool,

    /// CA bundle used with --verify
    #[arg(long)]
    ca_file: Option<PathBuf>,

    #[arg(long, value_parser = parse_tls_version)]
    tls_min: Option<TlsVersion>,

    #[arg(long, value_parser = parse_tls_version)]
    tls_max: Option<TlsVersion>,

    /// Seconds
    #[arg(long, default_value_t = config::DEFAULT_CONNECT_TIMEOUT.as_secs())]
    connect_timeout: u64,

    /// Seconds to wait for each read, 0 waits forever
    #[arg(long, default_value_t = config::DEFAULT_READ_TIMEOUT.as_secs())]
    read_timeout: u64,

    /// Text whose arrival counts as success
    #[arg(long, default_value = config::DEFAULT_MARKER)]
    marker: String,

    /// Send NAME=VALUE headers (HPACK encoded) instead of the fixed request
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// PEM file holding certificate and key (built-in self-signed otherwise)
    #[arg(long)]
    cert: Option<PathBuf>,

    #[arg(long = "alpn", default_values_t = [ALPN_H2.to_string(), ALPN_HTTP11.to_string()])]
    alpn: Vec<String>,
}

fn parse_tls_version(s: &str) -> Result<TlsVersion, String> {
    s.parse().map_err(|e: h2probe::http::tls::TlsError| e.to_string())
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn probe(args: ProbeArgs) -> anyhow::Result<i32> {
    let mut builder = ProbeConfig::builder()
        .host(args.host)
        .port(args.port)
        .alpn(args.alpn.as_slice())
        .verify_peer(args.verify)
        .tls_versions(args.tls_min, args.tls_max)
        .connect_timeout(seconds(args.connect_timeout))
        .read_timeout(seconds(args.read_timeout))
        .marker(args.marker);
    if let Some(name) = args.servername {
        builder = builder.servername(name);
    }
    if let Some(ca_file) = args.ca_file {
        builder = builder.ca_file(ca_file);
    }
    if !args.headers.is_empty() {
        builder = builder.request_headers(args.headers);
    }
    let config = builder.build()?;

    let report = Prober::new(config).run(&mut ConsoleObserver::stdout())?;
    Ok(report.outcome.exit_code())
}

fn serve(args: ServeArgs) -> anyhow::Result<i32> {
    let mut builder = ResponderServer::builder().alpn(args.alpn.as_slice());
    if let Some(cert) = &args.cert {
        builder = builder
            .cert_file(cert)
            .with_context(|| format!("loading {}", cert.display()))?;
    }
    let server = builder
        .bind(args.listen.as_str())
        .with_context(|| format!("binding {}", args.listen))?;
    server.run()?;
    Ok(0)
}

fn main() {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let result = match cli.command {
        Command::Probe(args) => probe(args),
        Command::Serve(args) => serve(args),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::debug!("{:?}", e);
            println!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}
