//! Errors that end a scan run

use thiserror::Error;
use crate::transport::ProbeError;
use tvscan_core::ExportError;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No local network found: no non-loopback interface with an IPv4 address")]
    NoLocalNetwork,
    #[error("ARP resolution is not supported on platform '{0}'")]
    UnsupportedPlatform(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Network transport unavailable: {0}")]
    Transport(#[from] ProbeError),
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}
