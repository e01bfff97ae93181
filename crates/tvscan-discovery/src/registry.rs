//! Deduplicating set of addresses found alive during a sweep

use dashmap::DashMap;
use std::net::Ipv4Addr;
use tracing::debug;

/// Placeholder entry for an address that accepted at least one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveHost {
    pub ip: Ipv4Addr,
    /// Port of the first probe that got recorded
    pub port: Option<u16>,
}

/// Concurrently writable registry keyed by address
///
/// Writers race freely; the first insert for an address wins and later
/// inserts for the same address are no-ops.
#[derive(Debug, Default)]
pub struct LiveHostRegistry {
    hosts: DashMap<Ipv4Addr, LiveHost>,
}

impl LiveHostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ip` as alive. Returns true if this call created the entry.
    pub fn insert_if_absent(&self, ip: Ipv4Addr, port: Option<u16>) -> bool {
        let mut inserted = false;
        self.hosts.entry(ip).or_insert_with(|| {
            inserted = true;
            LiveHost { ip, port }
        });
        if inserted {
            debug!(ip = %ip, port = ?port, "Host alive");
        }
        inserted
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.hosts.contains_key(&ip)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Copy of the current entries, in no particular order
    pub fn snapshot(&self) -> Vec<LiveHost> {
        self.hosts.iter().map(|entry| *entry.value()).collect()
    }
}
