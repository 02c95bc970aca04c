//! Peer certificate summary
//!
//! Extracts the handful of X.509 fields a connection report prints.

use openssl::nid::Nid;
use openssl::ssl::SslRef;
use openssl::x509::{X509NameRef, X509Ref};
use std::fmt;

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Certificate subject (Common Name)
    pub subject: String,
    /// Certificate issuer (Common Name)
    pub issuer: String,
    /// Subject Alternative Names (DNS names and IP addresses)
    pub subject_alt_names: Vec<String>,
    /// Expiry, as OpenSSL formats it
    pub not_after: String,
}

impl CertInfo {
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: common_name(cert.subject_name()),
            issuer: common_name(cert.issuer_name()),
            subject_alt_names: subject_alt_names(cert),
            not_after: cert.not_after().to_string(),
        }
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

impl fmt::Display for CertInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CN={} issuer={} expires {}", self.subject, self.issuer, self.not_after)
    }
}

fn common_name(name: &X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "<undef>".to_string())
}

fn subject_alt_names(cert: &X509Ref) -> Vec<String> {
    let mut names = Vec::new();

    if let Some(san_ext) = cert.subject_alt_names() {
        for name in san_ext {
            if let Some(dns) = name.dnsname() {
                names.push(format!("DNS:{}", dns));
            } else if let Some(ip) = name.ipaddress() {
                let addr = match ip.len() {
                    4 => {
                        let octets: [u8; 4] = [ip[0], ip[1], ip[2], ip[3]];
                        Some(std::net::IpAddr::from(octets))
                    }
                    16 => {
                        let mut octets = [0u8; 16];
                        octets.copy_from_slice(ip);
                        Some(std::net::IpAddr::from(octets))
                    }
                    _ => None,
                };
                if let Some(addr) = addr {
                    names.push(format!("IP:{}", addr));
                }
            }
        }
    }

    names
}

/// Summary of the certificate the peer presented, if any
pub fn peer_certificate(ssl: &SslRef) -> Option<CertInfo> {
    ssl.peer_certificate().map(|cert| CertInfo::from_x509(&cert))
}
