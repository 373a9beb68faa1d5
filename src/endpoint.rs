// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The [`Endpoint`] data model: an IPv4 address plus a UDP port, with the
//! canonicalization rule spec.md §3/§4.1 requires before any comparison or
//! map lookup — an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) collapses to
//! its bare IPv4 form, since UDP source addresses returned by the OS may
//! carry the mapped form while a listing protocol supplies the bare one.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
    str::FromStr,
};

/// An IPv4 address + UDP port pair. Two endpoints are equal iff both
/// components are equal after canonicalization — see [`Endpoint::canonicalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Canonicalizes a [`SocketAddr`], collapsing an IPv4-mapped IPv6
    /// representation to its bare IPv4 form. Returns `None` for an IPv6
    /// address that is not an IPv4 mapping (IPv6 is out of scope, spec.md §1).
    pub fn from_socket_addr(addr: SocketAddr) -> Option<Self> {
        let port = addr.port();
        match addr.ip() {
            IpAddr::V4(ip) => Some(Self { ip, port }),
            IpAddr::V6(ip) => ip.to_ipv4_mapped().map(|ip| Self { ip, port }),
        }
    }

    pub fn to_socket_addr_v4(self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }

    /// Idempotent by construction: canonicalization happens once, at
    /// construction time via [`Endpoint::from_socket_addr`] or [`FromStr`];
    /// re-canonicalizing an already-canonical `Endpoint` is a no-op because
    /// there is no mapped-IPv6 representation left to collapse.
    pub fn canonicalize(self) -> Self {
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parses `a.b.c.d:port`. Listing protocols that hand endpoints to the
/// Monitor in bare `ip:port` text form (GOA uncompressed list, the JSON-HTTP
/// and text-file listers) go through this path.
impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid endpoint {s:?}: {e}"))?;
        Ok(Self::new(*addr.ip(), addr.port()))
    }
}
