//! Candidate address enumeration
//!
//! Produces the host addresses of a subnet, skipping the network and
//! broadcast addresses. The range is a plain value and can be iterated any
//! number of times.

use crate::error::DiscoveryError;
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Where candidate addresses come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    /// `a.b.c.1` through `a.b.c.254`
    FixedPrefix([u8; 3]),
    /// The subnet of the first non-loopback IPv4 interface
    LocalSubnet,
}

impl AddressSource {
    /// Resolve the source into a concrete host range
    pub fn resolve(&self) -> Result<HostRange, DiscoveryError> {
        match self {
            Self::FixedPrefix(prefix) => Ok(HostRange::fixed_prefix(*prefix)),
            Self::LocalSubnet => local_subnet(),
        }
    }
}

/// Host addresses of an IPv4 subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRange {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl HostRange {
    /// Build the range containing `addr`; host bits of `addr` are ignored
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        let prefix_len = prefix_len.min(32);
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix_len));
        Self {
            network,
            prefix_len,
        }
    }

    /// The /24 behind a three-octet prefix
    pub fn fixed_prefix(prefix: [u8; 3]) -> Self {
        Self::new(Ipv4Addr::new(prefix[0], prefix[1], prefix[2], 0), 24)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_len))
    }

    /// Number of host addresses the range yields
    pub fn len(&self) -> u64 {
        let span = u64::from(u32::from(self.broadcast()) - u32::from(self.network));
        span.saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        (u32::from(ip) & mask(self.prefix_len)) == u32::from(self.network)
    }

    pub fn iter(&self) -> HostIter {
        HostIter {
            next: u32::from(self.network).saturating_add(1),
            end: u32::from(self.broadcast()),
        }
    }
}

impl IntoIterator for HostRange {
    type Item = Ipv4Addr;
    type IntoIter = HostIter;

    fn into_iter(self) -> HostIter {
        self.iter()
    }
}

impl IntoIterator for &HostRange {
    type Item = Ipv4Addr;
    type IntoIter = HostIter;

    fn into_iter(self) -> HostIter {
        self.iter()
    }
}

impl std::fmt::Display for HostRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Iterator over the host addresses of a [`HostRange`]
#[derive(Debug, Clone)]
pub struct HostIter {
    next: u32,
    /// Exclusive; the broadcast address
    end: u32,
}

impl Iterator for HostIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next >= self.end {
            return None;
        }
        let ip = Ipv4Addr::from(self.next);
        self.next += 1;
        Some(ip)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for HostIter {}

fn mask(prefix_len: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0)
}

/// Parse a three-octet prefix such as `192.168.18` (a trailing dot is allowed)
pub fn parse_prefix(s: &str) -> Result<[u8; 3], DiscoveryError> {
    let trimmed = s.trim().trim_end_matches('.');
    let octets: Vec<&str> = trimmed.split('.').collect();
    if octets.len() != 3 {
        return Err(DiscoveryError::InvalidConfig(format!(
            "network prefix '{}' must have exactly three octets",
            s
        )));
    }

    let mut prefix = [0u8; 3];
    for (slot, octet) in prefix.iter_mut().zip(octets) {
        *slot = octet.parse().map_err(|_| {
            DiscoveryError::InvalidConfig(format!("invalid octet '{}' in prefix '{}'", octet, s))
        })?;
    }
    Ok(prefix)
}

/// IPv4 configuration of one host interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceV4 {
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
}

/// Subnet of the first non-loopback interface that has an IPv4 address
pub fn local_subnet() -> Result<HostRange, DiscoveryError> {
    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "Failed to list network interfaces");
            return Err(DiscoveryError::NoLocalNetwork);
        }
    };

    let candidates = interfaces.into_iter().flat_map(|iface| {
        let name = iface.name;
        iface
            .addr
            .into_iter()
            .filter_map(move |addr| match addr {
                network_interface::Addr::V4(v4) => Some(InterfaceV4 {
                    name: name.clone(),
                    ip: v4.ip,
                    netmask: v4.netmask,
                }),
                _ => None,
            })
    });

    let range = select_subnet(candidates)?;
    info!(subnet = %range, hosts = range.len(), "Using local subnet");
    Ok(range)
}

/// Pick the first eligible interface and derive its subnet
pub fn select_subnet(
    interfaces: impl IntoIterator<Item = InterfaceV4>,
) -> Result<HostRange, DiscoveryError> {
    for iface in interfaces {
        if iface.ip.is_loopback() || iface.ip.is_unspecified() {
            debug!(interface = %iface.name, ip = %iface.ip, "Skipping interface");
            continue;
        }

        // Count bits in netmask
        let prefix_len = iface
            .netmask
            .map(|m| u32::from(m).count_ones() as u8)
            .unwrap_or(24);

        debug!(interface = %iface.name, ip = %iface.ip, prefix = prefix_len, "Selected interface");
        return Ok(HostRange::new(iface.ip, prefix_len));
    }

    Err(DiscoveryError::NoLocalNetwork)
}
