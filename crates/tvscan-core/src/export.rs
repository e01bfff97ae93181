//! Export sinks for sorted device records

use crate::device::DeviceRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File name used when no output path is configured
pub const DEFAULT_EXPORT_FILE: &str = "tvs_detectados.json";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Downstream consumer of a finished scan
pub trait RecordSink {
    /// Persist records in the order given
    fn write(&self, records: &[DeviceRecord]) -> Result<(), ExportError>;
}

/// Writes records as an indented JSON array
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load records from a previous export
    pub fn load(path: &Path) -> Result<Vec<DeviceRecord>, ExportError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for JsonFileSink {
    fn default() -> Self {
        Self::new(DEFAULT_EXPORT_FILE)
    }
}

impl RecordSink for JsonFileSink {
    fn write(&self, records: &[DeviceRecord]) -> Result<(), ExportError> {
        let content = serde_json::to_string_pretty(records)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), count = records.len(), "Exported device records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Brand, DeviceStatus};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn sample() -> Vec<DeviceRecord> {
        vec![
            DeviceRecord::active(Ipv4Addr::new(10, 0, 0, 10), "LivingRoom", Brand::Chromecast),
            DeviceRecord::new(Ipv4Addr::new(10, 0, 0, 9), "Smart TV", Brand::Unknown, DeviceStatus::Detected),
        ]
    }

    #[test]
    fn test_write_indented_array_and_load_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join(DEFAULT_EXPORT_FILE);
        let sink = JsonFileSink::new(&path);

        sink.write(&sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {\n    \"ip\": \"10.0.0.10\""));
        assert_eq!(JsonFileSink::load(&path).unwrap(), sample());
    }

    #[test]
    fn test_empty_scan_writes_empty_array() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.json");
        JsonFileSink::new(&path).write(&[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_write_failure_leaves_records_untouched() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be overwritten by a file
        let sink = JsonFileSink::new(temp_dir.path());
        let records = sample();

        let err = sink.write(&records).unwrap_err();
        assert!(matches!(err, ExportError::IoError(_)));
        assert_eq!(records.len(), 2);
    }
}
