// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Client IP Extraction
//!
//! `X-Forwarded-For` is honoured only when the direct peer is a configured
//! trusted proxy. The chain is walked right to left, skipping trusted hops;
//! the first untrusted address is the client. Anything unexpected falls
//! back to the peer address.

use std::net::IpAddr;
use tracing::warn;

/// An IP network in CIDR form. Host bits are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    /// Parse `addr` or `addr/prefix`.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (addr, prefix) = match entry.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix.parse::<u8>().ok()?)),
            None => (entry, None),
        };
        let addr: IpAddr = addr.parse().ok()?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return None;
        }
        Some(Self { addr, prefix })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    networks: Vec<IpNetwork>,
}

impl TrustedProxies {
    /// Invalid entries are logged and skipped.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        let networks = entries
            .iter()
            .filter_map(|entry| {
                let entry = entry.as_ref();
                let parsed = IpNetwork::parse(entry);
                if parsed.is_none() {
                    warn!(entry = %entry, "Ignoring invalid trusted proxy entry");
                }
                parsed
            })
            .collect();
        Self { networks }
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    fn is_trusted(&self, candidate: &str) -> bool {
        match candidate.parse::<IpAddr>() {
            Ok(ip) => self.networks.iter().any(|n| n.contains(ip)),
            Err(_) => false,
        }
    }

    pub fn client_ip(&self, remote: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
        if self.networks.is_empty() || !self.networks.iter().any(|n| n.contains(remote)) {
            return remote;
        }
        let Some(header) = forwarded_for else {
            return remote;
        };

        let remote_str = remote.to_string();
        let mut chain: Vec<&str> = header
            .split(',')
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .collect();
        if chain.is_empty() {
            return remote;
        }
        chain.push(&remote_str);

        while chain.last().is_some_and(|hop| self.is_trusted(hop)) {
            chain.pop();
        }

        chain
            .last()
            .and_then(|hop| hop.parse::<IpAddr>().ok())
            .unwrap_or(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_network_parsing() {
        assert!(IpNetwork::parse("10.0.0.0/8").is_some());
        assert!(IpNetwork::parse("10.0.0.1").is_some());
        assert!(IpNetwork::parse("2001:db8::/32").is_some());
        assert!(IpNetwork::parse("10.0.0.0/33").is_none());
        assert!(IpNetwork::parse("not-an-ip").is_none());

        let net = IpNetwork::parse("10.1.2.3/8").unwrap();
        assert!(net.contains(ip("10.200.0.1")));
        assert!(!net.contains(ip("11.0.0.1")));
        assert!(IpNetwork::parse("0.0.0.0/0").unwrap().contains(ip("8.8.8.8")));
    }

    #[test]
    fn test_untrusted_peer_ignores_header() {
        let proxies = TrustedProxies::from_entries(&["10.0.0.0/8"]);
        assert_eq!(
            proxies.client_ip(ip("203.0.113.5"), Some("1.2.3.4")),
            ip("203.0.113.5")
        );
        let none = TrustedProxies::default();
        assert_eq!(none.client_ip(ip("10.0.0.1"), Some("1.2.3.4")), ip("10.0.0.1"));
    }

    #[test]
    fn test_walks_chain_right_to_left() {
        let proxies = TrustedProxies::from_entries(&["10.0.0.0/8", "bogus", "192.168.1.1"]);
        assert_eq!(
            proxies.client_ip(ip("10.0.0.2"), Some("198.51.100.7, 203.0.113.9, 192.168.1.1")),
            ip("203.0.113.9")
        );
        assert_eq!(
            proxies.client_ip(ip("10.0.0.2"), Some("10.0.0.3, 10.0.0.4")),
            ip("10.0.0.2")
        );
        assert_eq!(
            proxies.client_ip(ip("10.0.0.2"), Some("garbage")),
            ip("10.0.0.2")
        );
        assert_eq!(proxies.client_ip(ip("10.0.0.2"), None), ip("10.0.0.2"));
        assert_eq!(proxies.client_ip(ip("10.0.0.2"), Some(" , ")), ip("10.0.0.2"));
    }
}
