//! tvscan Discovery - Live host discovery and device classification
//!
//! This crate provides the scan pipeline:
//! - Address sources (fixed /24 prefix or the local subnet)
//! - A bounded, deadline-aware probe scheduler
//! - TCP liveness probing into a deduplicating live-host registry
//! - An ordered decision list that identifies smart-TV and streaming devices
//! - An ARP sweep that maps addresses to hardware addresses
//! - Deep reports for Chromecast and Android devices

pub mod address;
pub mod arp;
pub mod classify;
pub mod config;
pub mod error;
pub mod liveness;
pub mod registry;
pub mod report;
pub mod scanner;
pub mod scheduler;
pub mod transport;

pub use address::{local_subnet, AddressSource, HostRange};
pub use arp::{ArpError, MacAddress, MacResolver, SystemMacResolver};
pub use classify::{Classifier, ClassifierConfig};
pub use config::{ScanConfig, ScanMode};
pub use error::DiscoveryError;
pub use registry::LiveHostRegistry;
pub use scanner::{ArpScanner, ScanOutcome, SweepStats, TvScanner};
pub use scheduler::{ProbeScheduler, ProbeTarget};
pub use transport::{HttpReply, NetTransport, ProbeError, ProbeTransport};
