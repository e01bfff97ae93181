//! Device records produced by a scan

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;

/// Classification tag attached to a device record
///
/// The fixed vocabulary covers the devices the classifier can identify.
/// ARP sweeps have no protocol-level identification and carry the resolved
/// hardware address instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Brand {
    Chromecast,
    Roku,
    LgWebOs,
    Samsung,
    AndroidFireTv,
    Unknown,
    /// Raw MAC address reported by an ARP sweep
    Hardware(String),
}

impl Brand {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chromecast => "Chromecast",
            Self::Roku => "Roku",
            Self::LgWebOs => "LG-WebOS",
            Self::Samsung => "Samsung",
            Self::AndroidFireTv => "Android/FireTV",
            Self::Unknown => "Unknown",
            Self::Hardware(mac) => mac,
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Brand {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Chromecast" => Self::Chromecast,
            "Roku" => Self::Roku,
            "LG-WebOS" => Self::LgWebOs,
            "Samsung" => Self::Samsung,
            "Android/FireTV" => Self::AndroidFireTv,
            "Unknown" => Self::Unknown,
            _ => Self::Hardware(s),
        }
    }
}

impl Serialize for Brand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Brand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Brand::from)
    }
}

/// How far identification of a device got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// A protocol-specific identification rule matched
    Active,
    /// Only port reachability was confirmed
    Detected,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Detected => f.write_str("Detected"),
        }
    }
}

/// One live address and what it was identified as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// IPv4 address, unique per scan output
    pub ip: Ipv4Addr,
    /// Human-readable label (may be empty)
    pub name: String,
    pub brand: Brand,
    pub status: DeviceStatus,
}

impl DeviceRecord {
    pub fn new(ip: Ipv4Addr, name: impl Into<String>, brand: Brand, status: DeviceStatus) -> Self {
        Self {
            ip,
            name: name.into(),
            brand,
            status,
        }
    }

    /// Record for a device identified by a protocol handshake
    pub fn active(ip: Ipv4Addr, name: impl Into<String>, brand: Brand) -> Self {
        Self::new(ip, name, brand, DeviceStatus::Active)
    }
}

/// Ordering applied to the final record list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Compare the dotted-quad strings ("10.0.0.10" before "10.0.0.9").
    /// Matches the ordering existing export consumers expect.
    #[default]
    Lexicographic,
    /// Compare addresses as 32-bit integers
    Numeric,
}

/// Sort records in place by address
pub fn sort_records(records: &mut [DeviceRecord], order: SortOrder) {
    match order {
        SortOrder::Lexicographic => records.sort_by_cached_key(|r| r.ip.to_string()),
        SortOrder::Numeric => records.sort_by_key(|r| r.ip),
    }
}
