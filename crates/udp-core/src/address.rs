//! `udp://host:port` parsing.
//!
//! Stream endpoints are transport addresses, so the host must be an IP
//! literal. Hostnames are rejected rather than resolved.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

const SCHEME: &str = "udp";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("unsupported scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },
    #[error("malformed url: {reason}")]
    Malformed { reason: String },
}

impl AddressError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// A parsed stream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamAddress {
    pub host: IpAddr,
    pub port: u16,
    pub is_multicast: bool,
}

impl StreamAddress {
    /// IPv4-mapped IPv6 hosts (`::ffff:a.b.c.d`) are stored as plain IPv4.
    pub fn new(host: IpAddr, port: u16) -> Self {
        let host = host.to_canonical();
        Self {
            host,
            port,
            is_multicast: host.is_multicast(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let url = Url::parse(input.trim()).map_err(|e| AddressError::malformed(e.to_string()))?;

        if url.scheme() != SCHEME {
            return Err(AddressError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            });
        }

        // Non-special schemes keep IPv4 literals as opaque hosts, so they are
        // re-parsed here.
        let host = match url.host() {
            Some(Host::Ipv4(addr)) => IpAddr::V4(addr),
            Some(Host::Ipv6(addr)) => IpAddr::V6(addr),
            Some(Host::Domain(raw)) => raw
                .parse::<Ipv4Addr>()
                .map(IpAddr::V4)
                .map_err(|_| AddressError::malformed(format!("host '{}' is not an IP literal", raw)))?,
            None => return Err(AddressError::malformed("missing host")),
        };

        let port = url
            .port()
            .ok_or_else(|| AddressError::malformed("missing port"))?;
        if port == 0 {
            return Err(AddressError::malformed("port must be between 1 and 65535"));
        }

        Ok(Self::new(host, port))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl FromStr for StreamAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}
