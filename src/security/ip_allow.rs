//! IP allow-list matching.
//!
//! Entries are CIDR ranges (`10.0.0.0/8`) or single addresses, which are
//! treated as host routes. Host bits in a CIDR are ignored, so the
//! conventional `127.0.0.1/8` means the whole loopback block.

use std::net::IpAddr;

use ipnet::IpNet;

/// Parsed allow-list.
#[derive(Debug, Clone, Default)]
pub struct IpAllowList {
    networks: Vec<IpNet>,
}

impl IpAllowList {
    /// Parse entries, returning the list and any entries that did not parse.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> (Self, Vec<String>) {
        let mut networks = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();

        for entry in entries {
            let trimmed = entry.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(net) = trimmed.parse::<IpNet>() {
                networks.push(net.trunc());
            } else if let Ok(ip) = trimmed.parse::<IpAddr>() {
                networks.push(IpNet::from(ip));
            } else {
                rejected.push(trimmed.to_string());
            }
        }

        (Self { networks }, rejected)
    }

    /// Whether `ip` falls inside any configured range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = canonical_ip(ip);
        self.networks.iter().any(|net| net.contains(&ip))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }
}

/// Unwrap IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) so dual-stack
/// listeners see the same address an IPv4 listener would.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
