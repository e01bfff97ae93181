//! tvscan Core - Device records and export
//!
//! This crate provides the output side of a tvscan run:
//! - Device records with the brand vocabulary and identification status
//! - Deterministic ordering of records by address
//! - Export sinks that persist a sorted record list

pub mod device;
pub mod export;

pub use device::{sort_records, Brand, DeviceRecord, DeviceStatus, SortOrder};
pub use export::{ExportError, JsonFileSink, RecordSink, DEFAULT_EXPORT_FILE};
