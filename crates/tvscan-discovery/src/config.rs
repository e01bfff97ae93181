//! Scan configuration

use crate::address::{parse_prefix, AddressSource};
use crate::classify::ClassifierConfig;
use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tvscan_core::SortOrder;

/// Ports probed for liveness: Chromecast/Android TV, Samsung, Roku,
/// LG webOS, ADB and mDNS
pub const DEFAULT_PORTS: &[u16] = &[8008, 8009, 7676, 8001, 8002, 8060, 3000, 3001, 3002, 5555, 5353];

/// How candidate addresses are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    FixedPrefix,
    LocalSubnet,
}

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub mode: ScanMode,
    /// Three-octet prefix used in fixed-prefix mode (e.g., "192.168.18")
    pub prefix: String,
    /// Ports probed on every candidate address
    pub ports: Vec<u16>,
    /// Concurrent TCP liveness probes
    pub max_workers: usize,
    /// Concurrent ARP resolutions
    pub arp_workers: usize,
    /// Concurrent classifications after the sweep
    pub classify_workers: usize,
    pub connect_timeout_ms: u64,
    /// Deadline for scheduling new probes, from the start of a sweep
    pub deadline_secs: u64,
    pub sort_order: SortOrder,
    /// Interface handed to `arping` (platform default when unset)
    pub arp_interface: Option<String>,
    pub classifier: ClassifierConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::FixedPrefix,
            prefix: "192.168.18".to_string(),
            ports: DEFAULT_PORTS.to_vec(),
            max_workers: 200,
            arp_workers: 50,
            classify_workers: 32,
            connect_timeout_ms: 150,
            deadline_secs: 30,
            sort_order: SortOrder::Lexicographic,
            arp_interface: None,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn address_source(&self) -> Result<AddressSource, DiscoveryError> {
        match self.mode {
            ScanMode::FixedPrefix => Ok(AddressSource::FixedPrefix(parse_prefix(&self.prefix)?)),
            ScanMode::LocalSubnet => Ok(AddressSource::LocalSubnet),
        }
    }

    /// Classifier settings with the TCP check timeout inherited from the
    /// liveness timeout unless set explicitly
    pub fn classifier_config(&self) -> ClassifierConfig {
        let mut classifier = self.classifier.clone();
        classifier.connect_timeout_ms = classifier.connect_timeout_ms.or(Some(self.connect_timeout_ms));
        classifier
    }

    /// Reject settings that would make a scan meaningless
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.ports.is_empty() {
            return Err(DiscoveryError::InvalidConfig("no ports to probe".to_string()));
        }
        if self.max_workers == 0 || self.arp_workers == 0 || self.classify_workers == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "worker counts must be greater than zero".to_string(),
            ));
        }
        if self.mode == ScanMode::FixedPrefix {
            parse_prefix(&self.prefix)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_timing_constants() {
        let config = ScanConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_millis(150));
        assert_eq!(config.deadline(), Duration::from_secs(30));
        assert_eq!(config.max_workers, 200);
        assert_eq!(config.arp_workers, 50);
        assert_eq!(config.classifier.request_timeout_ms, 1000);
        assert_eq!(config.ports.len(), 11);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_address_source_from_mode() {
        let mut config = ScanConfig::default();
        assert_eq!(
            config.address_source().unwrap(),
            AddressSource::FixedPrefix([192, 168, 18])
        );
        config.mode = ScanMode::LocalSubnet;
        assert_eq!(config.address_source().unwrap(), AddressSource::LocalSubnet);
    }

    #[test]
    fn test_classifier_inherits_connect_timeout() {
        let mut config = ScanConfig {
            connect_timeout_ms: 400,
            ..ScanConfig::default()
        };
        assert_eq!(config.classifier_config().connect_timeout_ms, Some(400));

        config.classifier.connect_timeout_ms = Some(50);
        assert_eq!(config.classifier_config().connect_timeout_ms, Some(50));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = ScanConfig {
            ports: Vec::new(),
            ..ScanConfig::default()
        };
        assert!(matches!(config.validate(), Err(DiscoveryError::InvalidConfig(_))));

        let config = ScanConfig {
            max_workers: 0,
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ScanConfig {
            prefix: "10.0".to_string(),
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
