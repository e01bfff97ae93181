//! Hardware address resolution through the operating system's ARP tools

use async_trait::async_trait;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

/// Time allowed for one resolver command
pub const ARP_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum ArpError {
    #[error("No MAC address found for {0}")]
    NotFound(Ipv4Addr),
    #[error("ARP resolution is not supported on platform '{0}'")]
    UnsupportedPlatform(String),
    #[error("Failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Timed out resolving {0}")]
    Timeout(Ipv4Addr),
}

/// A MAC address in lowercase, colon-separated form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacAddress(String);

impl MacAddress {
    /// Parse `aa:bb:cc:dd:ee:ff` or `AA-BB-CC-DD-EE-FF`; single-digit
    /// groups (as printed by BSD `arp`) are zero-padded
    pub fn parse(token: &str) -> Option<Self> {
        let sep = if token.contains(':') { ':' } else { '-' };
        let groups: Vec<&str> = token.split(sep).collect();
        if groups.len() != 6 {
            return None;
        }

        let mut octets = Vec::with_capacity(6);
        for group in groups {
            if group.is_empty() || group.len() > 2 {
                return None;
            }
            octets.push(u8::from_str_radix(group, 16).ok()?);
        }

        Some(Self(
            octets
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(":"),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps an address to the hardware address that answers for it
#[async_trait]
pub trait MacResolver: Send + Sync {
    async fn resolve_mac(&self, ip: Ipv4Addr) -> Result<MacAddress, ArpError>;
}

/// Operating systems with a known resolver command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Map an `std::env::consts::OS` value
    pub fn from_os(os: &str) -> Result<Self, ArpError> {
        match os {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOs),
            "windows" => Ok(Self::Windows),
            other => Err(ArpError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn current() -> Result<Self, ArpError> {
        Self::from_os(std::env::consts::OS)
    }

    /// Interface `arping` is pointed at when none is configured
    pub fn default_interface(&self) -> &'static str {
        match self {
            Self::Linux => "eth0",
            Self::MacOs => "en0",
            Self::Windows => "",
        }
    }
}

/// Resolver that shells out to `arping` (Linux, macOS) or `arp -a` (Windows)
#[derive(Debug, Clone)]
pub struct SystemMacResolver {
    platform: Platform,
    interface: String,
    timeout: Duration,
}

impl SystemMacResolver {
    /// Resolver for the running platform. Fails on platforms without a
    /// supported command.
    pub fn new(interface: Option<String>) -> Result<Self, ArpError> {
        Ok(Self::for_platform(Platform::current()?, interface))
    }

    pub fn for_platform(platform: Platform, interface: Option<String>) -> Self {
        let interface = interface.unwrap_or_else(|| platform.default_interface().to_string());
        Self {
            platform,
            interface,
            timeout: ARP_COMMAND_TIMEOUT,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Program and arguments used to resolve `ip`
    pub fn command_line(&self, ip: Ipv4Addr) -> (&'static str, Vec<String>) {
        let ip = ip.to_string();
        match self.platform {
            // iputils arping
            Platform::Linux => (
                "arping",
                vec!["-c".into(), "1".into(), "-w".into(), "1".into(), "-I".into(), self.interface.clone(), ip],
            ),
            // Habets arping
            Platform::MacOs => (
                "arping",
                vec!["-c".into(), "1".into(), "-i".into(), self.interface.clone(), ip],
            ),
            Platform::Windows => ("arp", vec!["-a".into(), ip]),
        }
    }
}

#[async_trait]
impl MacResolver for SystemMacResolver {
    async fn resolve_mac(&self, ip: Ipv4Addr) -> Result<MacAddress, ArpError> {
        let (program, args) = self.command_line(ip);
        trace!(ip = %ip, program = program, args = ?args, "Resolving MAC");

        let output = Command::new(program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        // arping exits non-zero when nobody answers; the output decides
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ArpError::Timeout(ip))?
            .map_err(|source| ArpError::Command {
                program: program.to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push('\n');
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let mac = parse_mac(&combined, ip).ok_or(ArpError::NotFound(ip))?;
        debug!(ip = %ip, mac = %mac, "Resolved MAC");
        Ok(mac)
    }
}

const TOKEN_PUNCT: &[char] = &['[', ']', '(', ')', ':', ','];

/// Find the MAC address reported for `ip` in resolver output
///
/// Only lines that mention `ip` as a whole token are considered, so a
/// reply for 192.168.1.10 is not taken for 192.168.1.1.
pub fn parse_mac(output: &str, ip: Ipv4Addr) -> Option<MacAddress> {
    let target = ip.to_string();

    for line in output.lines() {
        let tokens: Vec<&str> = line
            .split_whitespace()
            .map(|t| t.trim_matches(TOKEN_PUNCT))
            .collect();

        if !tokens.iter().any(|t| *t == target) {
            continue;
        }

        if let Some(mac) = tokens.iter().find_map(|t| MacAddress::parse(t)) {
            return Some(mac);
        }
    }
    None
}
