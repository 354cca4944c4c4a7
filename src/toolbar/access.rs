//! Client address filtering
//!
//! `hosts` entries are single addresses (`127.0.0.1`, `::1`) or CIDR
//! networks (`10.0.0.0/8`, `fd00::/8`). IPv4-mapped IPv6 peers
//! (`::ffff:127.0.0.1`) match IPv4 entries.

use std::net::IpAddr;
use std::str::FromStr;

/// An allowed client network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostNetwork {
    addr: IpAddr,
    prefix_len: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid host network {0:?}")]
pub struct InvalidHost(pub String);

impl FromStr for HostNetwork {
    type Err = InvalidHost;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidHost(s.to_string());
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };

        let addr = IpAddr::from_str(addr).map_err(|_| invalid())?.to_canonical();
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
            None => max,
        };
        if prefix_len > max {
            return Err(invalid());
        }

        Ok(Self { addr, prefix_len })
    }
}

impl HostNetwork {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                masked(u32::from(net) as u128, 32, self.prefix_len)
                    == masked(u32::from(ip) as u128, 32, self.prefix_len)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                masked(u128::from(net), 128, self.prefix_len)
                    == masked(u128::from(ip), 128, self.prefix_len)
            }
            _ => false,
        }
    }
}

fn masked(bits: u128, width: u32, prefix_len: u8) -> u128 {
    let host_bits = width - u32::from(prefix_len);
    if host_bits >= 128 {
        0
    } else {
        bits >> host_bits
    }
}

/// The configured set of allowed client networks
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    networks: Vec<HostNetwork>,
}

impl HostFilter {
    /// Parse configured entries; invalid ones are reported and skipped
    pub fn from_config(hosts: &[String]) -> Self {
        let networks = hosts
            .iter()
            .filter_map(|entry| match entry.parse::<HostNetwork>() {
                Ok(net) => Some(net),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring toolbar host entry");
                    None
                }
            })
            .collect();
        Self { networks }
    }

    /// Whether `peer` may use the toolbar; an unknown peer never may
    pub fn allows(&self, peer: Option<IpAddr>) -> bool {
        peer.is_some_and(|ip| self.networks.iter().any(|net| net.contains(ip)))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
