// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Network address of a service instance.

use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

/// Network address of a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// TCP/IP socket address.
    Ip(SocketAddr),
    /// Unix domain socket path.
    Unix(PathBuf),
}

impl Address {
    /// Returns the socket address when this is an IP address.
    pub fn as_ip(&self) -> Option<&SocketAddr> {
        match self {
            Address::Ip(addr) => Some(addr),
            Address::Unix(_) => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(addr) => write!(f, "{addr}"),
            Address::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Ip(addr)
    }
}

impl From<PathBuf> for Address {
    fn from(path: PathBuf) -> Self {
        Address::Unix(path)
    }
}

impl FromStr for Address {
    type Err = AddrParseError;

    /// Parses `ip:port`, or `unix://<path>` for a unix socket.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix://") {
            return Ok(Address::Unix(PathBuf::from(path)));
        }
        s.parse::<SocketAddr>().map(Address::Ip)
    }
}
