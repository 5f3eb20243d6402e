//! Peer address: a `host:port` pair used to name leaves and super-peers on the wire.

use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// A `(host, port)` pair identifying a node on the overlay.
///
/// Two addresses are equal iff both components are equal; no DNS resolution or
/// normalization is performed, so `"localhost:9000"` and `"127.0.0.1:9000"` are distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Address this socket would use to dial the peer, e.g. for `tokio::net::TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| CodecError::BadAddress(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| CodecError::BadAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(CodecError::BadAddress(s.to_string()));
        }
        Ok(Address::new(host, port))
    }
}
