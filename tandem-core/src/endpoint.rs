//! Endpoint abstraction for transport-agnostic socket addressing.
//!
//! Provides unified addressing for TCP and in-process transports with parsing
//! support. Parsing never touches the network except for resolving TCP host
//! names.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP transport: `tcp://host:port`
    Tcp(SocketAddr),
    /// In-process transport: `inproc://name`
    Inproc(String),
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`
    /// - `tcp://[::1]:5555` (IPv6)
    /// - `tcp://localhost:5555` (resolved, first address wins)
    /// - `tcp://*:5555` (all interfaces, bind only)
    /// - `tcp://127.0.0.1:*` (ephemeral port, bind only)
    /// - `inproc://name`
    ///
    /// # Examples
    ///
    /// ```
    /// use tandem_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert!(endpoint.is_tcp());
    ///
    /// let endpoint = Endpoint::parse("inproc://my-endpoint").unwrap();
    /// assert!(endpoint.is_inproc());
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Returns true if this is a TCP endpoint.
    pub fn is_tcp(&self) -> bool {
        matches!(self, Endpoint::Tcp(_))
    }

    /// Returns true if this is an inproc endpoint.
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }

    /// Returns true if this endpoint still needs resolving by the OS
    /// (ephemeral port or wildcard host). Such endpoints can only be bound.
    pub fn is_wildcard(&self) -> bool {
        match self {
            Endpoint::Tcp(addr) => addr.port() == 0 || addr.ip().is_unspecified(),
            Endpoint::Inproc(_) => false,
        }
    }
}

fn parse_tcp(addr: &str) -> Result<SocketAddr, EndpointError> {
    let invalid = || EndpointError::InvalidTcpAddress(addr.to_string());

    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        return Ok(socket_addr);
    }

    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    let port = match port {
        "*" => 0,
        p => p.parse::<u16>().map_err(|_| invalid())?,
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host {
        "" => Err(invalid()),
        "*" => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
        h => {
            if let Ok(ip) = h.parse::<IpAddr>() {
                return Ok(SocketAddr::new(ip, port));
            }
            (h, port)
                .to_socket_addrs()
                .map_err(|_| invalid())?
                .next()
                .ok_or_else(invalid)
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            Ok(Endpoint::Tcp(parse_tcp(addr)?))
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ))
            } else {
                Ok(Endpoint::Inproc(name.to_string()))
            }
        } else if let Some((scheme, _)) = s.split_once("://") {
            Err(EndpointError::UnsupportedTransport(scheme.to_string()))
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Inproc(name) => write!(f, "inproc://{}", name),
        }
    }
}

/// Errors that can occur when parsing, binding or connecting endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp:// or inproc://)")]
    InvalidScheme(String),

    #[error("Transport not supported: {0}://")]
    UnsupportedTransport(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),

    #[error("inproc endpoint '{0}' is already bound")]
    InprocInUse(String),

    #[error("inproc endpoint '{0}' not found (must bind before connect)")]
    InprocNotBound(String),

    #[error("Cannot connect to wildcard endpoint: {0}")]
    WildcardConnect(Endpoint),

    #[error("Incompatible peer: {local} cannot talk to {peer}")]
    Incompatible { local: String, peer: String },

    #[error("Cannot reach {endpoint}: {source}")]
    Unreachable {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_ipv4() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(_)));
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5555");
        assert!(!endpoint.is_wildcard());
    }

    #[test]
    fn test_parse_tcp_ipv6() {
        let endpoint = Endpoint::parse("tcp://[::1]:5555").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(addr) if addr.is_ipv6()));
    }

    #[test]
    fn test_parse_tcp_wildcards() {
        let any_port = Endpoint::parse("tcp://127.0.0.1:*").unwrap();
        assert_eq!(any_port, Endpoint::Tcp("127.0.0.1:0".parse().unwrap()));
        assert!(any_port.is_wildcard());

        let any_host = Endpoint::parse("tcp://*:5555").unwrap();
        assert_eq!(any_host, Endpoint::Tcp("0.0.0.0:5555".parse().unwrap()));
        assert!(any_host.is_wildcard());
    }

    #[test]
    fn test_parse_tcp_hostname() {
        let endpoint = Endpoint::parse("tcp://localhost:5555").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(addr) if addr.ip().is_loopback()));
    }

    #[test]
    fn test_invalid_scheme() {
        let result = Endpoint::parse("127.0.0.1:5555");
        assert!(matches!(result, Err(EndpointError::InvalidScheme(_))));
    }

    #[test]
    fn test_unsupported_transport() {
        let result = Endpoint::parse("ipc:///tmp/test.sock");
        assert!(matches!(result, Err(EndpointError::UnsupportedTransport(s)) if s == "ipc"));
    }

    #[test]
    fn test_invalid_tcp_address() {
        assert!(matches!(
            Endpoint::parse("tcp://127.0.0.1:port"),
            Err(EndpointError::InvalidTcpAddress(_))
        ));
        assert!(matches!(
            Endpoint::parse("tcp://127.0.0.1"),
            Err(EndpointError::InvalidTcpAddress(_))
        ));
        assert!(matches!(
            Endpoint::parse("tcp://:5555"),
            Err(EndpointError::InvalidTcpAddress(_))
        ));
    }

    #[test]
    fn test_parse_inproc() {
        let endpoint = Endpoint::parse("inproc://my-endpoint").unwrap();
        assert!(matches!(endpoint, Endpoint::Inproc(_)));
        assert_eq!(endpoint.to_string(), "inproc://my-endpoint");
    }

    #[test]
    fn test_invalid_inproc_empty() {
        let result = Endpoint::parse("inproc://");
        assert!(matches!(result, Err(EndpointError::InvalidInprocName(_))));
    }
}
