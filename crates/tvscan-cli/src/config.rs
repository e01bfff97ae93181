//! Configuration loading

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use tvscan_core::{SortOrder, DEFAULT_EXPORT_FILE};
use tvscan_discovery::config::DEFAULT_PORTS;
use tvscan_discovery::{ClassifierConfig, ScanConfig, ScanMode};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub arp: ArpSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSection {
    /// Scan the local subnet instead of the fixed prefix
    #[serde(default)]
    pub local_subnet: bool,
    /// Three-octet network prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Ports probed for liveness
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    /// Concurrent TCP probes
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Concurrent classifications
    #[serde(default = "default_classify_workers")]
    pub classify_workers: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            local_subnet: false,
            prefix: default_prefix(),
            ports: default_ports(),
            max_workers: default_max_workers(),
            classify_workers: default_classify_workers(),
            connect_timeout_ms: default_connect_timeout(),
            deadline_secs: default_deadline(),
        }
    }
}

fn default_prefix() -> String {
    "192.168.18".to_string()
}

fn default_ports() -> Vec<u16> {
    DEFAULT_PORTS.to_vec()
}

fn default_max_workers() -> usize {
    200
}

fn default_classify_workers() -> usize {
    32
}

fn default_connect_timeout() -> u64 {
    150
}

fn default_deadline() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArpSection {
    /// Interface for arping (platform default when unset)
    #[serde(default)]
    pub interface: Option<String>,
    /// Concurrent ARP resolutions
    #[serde(default = "default_arp_workers")]
    pub workers: usize,
}

impl Default for ArpSection {
    fn default() -> Self {
        Self {
            interface: None,
            workers: default_arp_workers(),
        }
    }
}

fn default_arp_workers() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Export file
    #[serde(default = "default_output_path")]
    pub path: String,
    /// Record ordering: "lexicographic" or "numeric"
    #[serde(default)]
    pub sort: SortOrder,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            sort: SortOrder::default(),
        }
    }
}

fn default_output_path() -> String {
    DEFAULT_EXPORT_FILE.to_string()
}

impl Config {
    /// Convert to ScanConfig
    pub fn to_scan_config(&self) -> ScanConfig {
        ScanConfig {
            mode: if self.scan.local_subnet {
                ScanMode::LocalSubnet
            } else {
                ScanMode::FixedPrefix
            },
            prefix: self.scan.prefix.clone(),
            ports: self.scan.ports.clone(),
            max_workers: self.scan.max_workers,
            arp_workers: self.arp.workers,
            classify_workers: self.scan.classify_workers,
            connect_timeout_ms: self.scan.connect_timeout_ms,
            deadline_secs: self.scan.deadline_secs,
            sort_order: self.output.sort,
            arp_interface: self.arp.interface.clone(),
            classifier: self.classifier.clone(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Comments written above each section of the default file
const SECTION_NOTES: &[(&str, &str)] = &[
    (
        "[scan]",
        "# TCP sweep. Set local_subnet = true to scan the first non-loopback\n\
         # interface instead of prefix. connect_timeout_ms also bounds the\n\
         # classifier's port checks unless [classifier] sets its own.",
    ),
    ("[arp]", "# ARP sweep. interface defaults to eth0 on Linux and en0 on macOS."),
    ("[output]", "# Export file and record order (\"lexicographic\" or \"numeric\")."),
    ("[classifier]", "# Endpoints and ports used to identify devices."),
];

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, with_section_notes(&content))?;
    Ok(())
}

fn with_section_notes(content: &str) -> String {
    let mut out = String::from("# tvscan configuration\n\n");
    for line in content.lines() {
        if let Some((_, note)) = SECTION_NOTES.iter().find(|(header, _)| *header == line.trim()) {
            out.push_str(note);
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.to_scan_config(), ScanConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scan]
            prefix = "10.1.2"
            deadline_secs = 5

            [output]
            sort = "numeric"

            [classifier]
            adb_port = 5556
            "#,
        )
        .unwrap();

        let scan = config.to_scan_config();
        assert_eq!(scan.prefix, "10.1.2");
        assert_eq!(scan.deadline_secs, 5);
        assert_eq!(scan.max_workers, 200);
        assert_eq!(scan.sort_order, SortOrder::Numeric);
        assert_eq!(scan.classifier.adb_port, 5556);
        assert_eq!(scan.classifier.chromecast_port, 8008);
        assert_eq!(scan.mode, ScanMode::FixedPrefix);
    }

    #[test]
    fn test_default_config_round_trips_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tvscan.toml");

        save_default_config(&path).unwrap();
        let config = load_config(&path).unwrap();

        assert_eq!(config.to_scan_config(), ScanConfig::default());
        assert_eq!(config.output.path, DEFAULT_EXPORT_FILE);
    }

    #[test]
    fn test_default_file_is_commented() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tvscan.toml");
        save_default_config(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("# tvscan configuration"));
        for (header, _) in SECTION_NOTES {
            let at = lines.iter().position(|line| line.trim() == *header).unwrap();
            assert!(lines[at - 1].starts_with('#'), "no comment above {}", header);
        }
    }

    #[test]
    fn test_scan_timeout_reaches_classifier() {
        let config: Config = toml::from_str("[scan]\nconnect_timeout_ms = 400\n").unwrap();
        let scan = config.to_scan_config();
        assert_eq!(scan.classifier_config().connect_timeout_ms, Some(400));
    }
}
