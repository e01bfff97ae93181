//! Detailed reports for Chromecast and Android devices
//!
//! Takes records from a previous scan and collects what the devices expose
//! about themselves:
//! 1. The Chromecast eureka_info document (build, uptime, hotspot state)
//! 2. Optionally, Android properties over ADB
//!
//! A source that fails is noted in the report's `errors` and the report is
//! still produced.

use crate::transport::{HttpReply, NetTransport, ProbeTransport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use tvscan_core::{Brand, DeviceRecord};

/// File the report is written to when no path is given
pub const DEFAULT_REPORT_FILE: &str = "chromecast_full_report.json";

/// Timeout for each eureka_info request and each ADB command
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// ADB commands run per device, keyed by report field
const ADB_QUERIES: &[(&str, &[&str])] = &[
    ("android_version", &["getprop", "ro.build.version.release"]),
    ("model", &["getprop", "ro.product.model"]),
    ("installed_apps", &["pm", "list", "packages"]),
];

/// Everything gathered about one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub name: String,
    pub ip: Ipv4Addr,
    pub timestamp: DateTime<Utc>,
    pub system: Map<String, Value>,
    pub android: BTreeMap<String, String>,
    pub raw: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl DeviceReport {
    fn new(record: &DeviceRecord) -> Self {
        Self {
            name: record.name.clone(),
            ip: record.ip,
            timestamp: Utc::now(),
            system: Map::new(),
            android: BTreeMap::new(),
            raw: Map::new(),
            errors: BTreeMap::new(),
        }
    }
}

/// Runs `adb shell` commands against a networked device
#[async_trait]
pub trait AdbShell: Send + Sync {
    /// Run `args` in a shell on `serial` (`host:port`) and return stdout
    async fn shell(&self, serial: &str, args: &[&str]) -> Result<String>;
}

/// The `adb` binary on PATH
#[derive(Debug, Clone)]
pub struct AdbCommand {
    timeout: Duration,
}

impl Default for AdbCommand {
    fn default() -> Self {
        Self {
            timeout: REPORT_TIMEOUT,
        }
    }
}

#[async_trait]
impl AdbShell for AdbCommand {
    async fn shell(&self, serial: &str, args: &[&str]) -> Result<String> {
        let output = Command::new("adb")
            .args(["-s", serial, "shell"])
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .context("adb timed out")?
            .context("Failed to run adb")?;

        if !output.status.success() {
            anyhow::bail!("adb failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Builds [`DeviceReport`]s
pub struct DeviceReporter {
    transport: Arc<dyn ProbeTransport>,
    adb: Option<Arc<dyn AdbShell>>,
    eureka_port: u16,
    adb_port: u16,
    timeout: Duration,
}

impl DeviceReporter {
    pub fn new(transport: Arc<dyn ProbeTransport>) -> Self {
        Self {
            transport,
            adb: None,
            eureka_port: 8008,
            adb_port: 5555,
            timeout: REPORT_TIMEOUT,
        }
    }

    /// Reporter on the real network
    pub fn networked() -> Result<Self> {
        let transport = NetTransport::new().context("Failed to create HTTP client")?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Also query Android properties over ADB
    pub fn with_adb(mut self, adb: Arc<dyn AdbShell>) -> Self {
        self.adb = Some(adb);
        self
    }

    /// Records worth a detailed report
    pub fn select(records: &[DeviceRecord]) -> Vec<&DeviceRecord> {
        records
            .iter()
            .filter(|r| matches!(r.brand, Brand::Chromecast | Brand::AndroidFireTv))
            .collect()
    }

    pub async fn report_all(&self, records: &[DeviceRecord]) -> Vec<DeviceReport> {
        let mut reports = Vec::new();
        for record in Self::select(records) {
            info!("Scanning {} ({})...", record.name, record.ip);
            reports.push(self.report(record).await);
        }
        reports
    }

    pub async fn report(&self, record: &DeviceRecord) -> DeviceReport {
        let mut report = DeviceReport::new(record);
        self.collect_eureka(&mut report).await;
        if let Some(adb) = &self.adb {
            self.collect_adb(adb.as_ref(), &mut report).await;
        }
        report
    }

    async fn collect_eureka(&self, report: &mut DeviceReport) {
        let url = format!("http://{}:{}/setup/eureka_info", report.ip, self.eureka_port);
        let reply = self.transport.http_get(&url, self.timeout).await;
        let body = match reply.and_then(HttpReply::into_ok_body) {
            Ok(body) => body,
            Err(e) => {
                debug!(ip = %report.ip, error = %e, "eureka_info request failed");
                report.errors.insert("eureka".to_string(), e.to_string());
                return;
            }
        };

        let eureka: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(e) => {
                report
                    .errors
                    .insert("eureka".to_string(), format!("Invalid JSON: {}", e));
                return;
            }
        };

        for key in ["build_version", "uptime"] {
            report
                .system
                .insert(key.to_string(), eureka.get(key).cloned().unwrap_or(Value::Null));
        }
        report.system.insert(
            "hotspot".to_string(),
            Value::Bool(eureka.get("hotspot_bssid").map(is_truthy).unwrap_or(false)),
        );
        report.raw.insert("eureka".to_string(), eureka);
    }

    async fn collect_adb(&self, adb: &dyn AdbShell, report: &mut DeviceReport) {
        let serial = format!("{}:{}", report.ip, self.adb_port);
        for (key, args) in ADB_QUERIES {
            match adb.shell(&serial, args).await {
                Ok(out) => {
                    report.android.insert(key.to_string(), out);
                }
                Err(e) => {
                    warn!(ip = %report.ip, error = %e, "ADB unavailable");
                    report
                        .errors
                        .insert("adb".to_string(), format!("ADB unavailable: {}", e));
                    return;
                }
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Write reports as an indented JSON array
pub fn write_reports(path: &Path, reports: &[DeviceReport]) -> Result<()> {
    let content = serde_json::to_string_pretty(reports)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;
    use std::sync::Mutex;
    use tvscan_core::DeviceStatus;

    const CAST: Ipv4Addr = Ipv4Addr::new(192, 168, 18, 20);

    struct FakeAdb {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AdbShell for FakeAdb {
        async fn shell(&self, serial: &str, args: &[&str]) -> Result<String> {
            self.calls.lock().unwrap().push(format!("{} {}", serial, args.join(" ")));
            if self.fail {
                anyhow::bail!("no devices/emulators found");
            }
            Ok(match args {
                ["getprop", "ro.build.version.release"] => "12".to_string(),
                ["getprop", "ro.product.model"] => "Chromecast HD".to_string(),
                _ => "package:com.google.android.youtube.tv".to_string(),
            })
        }
    }

    fn cast_record() -> DeviceRecord {
        DeviceRecord::active(CAST, "LivingRoom", Brand::Chromecast)
    }

    fn eureka_transport(body: &str) -> Arc<FakeTransport> {
        Arc::new(FakeTransport::new().http("http://192.168.18.20:8008/setup/eureka_info", HttpReply::ok(body)))
    }

    #[test]
    fn test_select_keeps_cast_and_android() {
        let records = vec![
            cast_record(),
            DeviceRecord::active(Ipv4Addr::new(192, 168, 18, 21), "Roku TV", Brand::Roku),
            DeviceRecord::active(Ipv4Addr::new(192, 168, 18, 22), "ADB Device", Brand::AndroidFireTv),
            DeviceRecord::new(Ipv4Addr::new(192, 168, 18, 23), "Smart TV", Brand::Unknown, DeviceStatus::Detected),
        ];
        let selected: Vec<_> = DeviceReporter::select(&records).iter().map(|r| r.ip.octets()[3]).collect();
        assert_eq!(selected, vec![20, 22]);
    }

    #[tokio::test]
    async fn test_eureka_fields_lifted_into_system() {
        let reporter = DeviceReporter::new(eureka_transport(
            r#"{"name":"LivingRoom","build_version":"1.56.500000","uptime":3600.5,"hotspot_bssid":"FA:8F:CA:00:00:01"}"#,
        ));

        let report = reporter.report(&cast_record()).await;

        assert_eq!(report.name, "LivingRoom");
        assert_eq!(report.system["build_version"], "1.56.500000");
        assert_eq!(report.system["uptime"], 3600.5);
        assert_eq!(report.system["hotspot"], true);
        assert_eq!(report.raw["eureka"]["name"], "LivingRoom");
        assert!(report.errors.is_empty());
        assert!(report.android.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_are_null_and_empty_bssid_is_no_hotspot() {
        let reporter = DeviceReporter::new(eureka_transport(r#"{"hotspot_bssid":""}"#));
        let report = reporter.report(&cast_record()).await;
        assert_eq!(report.system["build_version"], Value::Null);
        assert_eq!(report.system["hotspot"], false);
    }

    #[tokio::test]
    async fn test_unreachable_device_reports_error() {
        let reporter = DeviceReporter::new(Arc::new(FakeTransport::new()));
        let report = reporter.report(&cast_record()).await;
        assert!(report.errors.contains_key("eureka"));
        assert!(report.raw.is_empty());
    }

    #[tokio::test]
    async fn test_non_200_eureka_reports_status() {
        let reporter = DeviceReporter::new(Arc::new(FakeTransport::new().http(
            "http://192.168.18.20:8008/setup/eureka_info",
            HttpReply {
                status: 403,
                body: "{}".to_string(),
            },
        )));
        let report = reporter.report(&cast_record()).await;
        assert_eq!(report.errors["eureka"], "Unexpected HTTP status 403");
        assert!(report.system.is_empty());
    }

    #[tokio::test]
    async fn test_adb_properties_collected() {
        let adb = Arc::new(FakeAdb {
            calls: Mutex::new(Vec::new()),
            fail: false,
        });
        let reporter = DeviceReporter::new(eureka_transport("{}")).with_adb(adb.clone());

        let report = reporter.report(&cast_record()).await;

        assert_eq!(report.android["android_version"], "12");
        assert_eq!(report.android["model"], "Chromecast HD");
        assert_eq!(report.android["installed_apps"], "package:com.google.android.youtube.tv");
        assert_eq!(
            adb.calls.lock().unwrap().first().map(String::as_str),
            Some("192.168.18.20:5555 getprop ro.build.version.release")
        );
    }

    #[tokio::test]
    async fn test_adb_failure_recorded_not_fatal() {
        let adb = Arc::new(FakeAdb {
            calls: Mutex::new(Vec::new()),
            fail: true,
        });
        let reporter = DeviceReporter::new(eureka_transport(r#"{"uptime":5}"#)).with_adb(adb.clone());

        let report = reporter.report(&cast_record()).await;

        assert!(report.errors["adb"].starts_with("ADB unavailable"));
        assert_eq!(report.system["uptime"], 5);
        assert_eq!(adb.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_reports() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_REPORT_FILE);
        let reporter = DeviceReporter::new(eureka_transport("{}"));

        let reports = reporter.report_all(&[cast_record()]).await;
        write_reports(&path, &reports).unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["ip"], "192.168.18.20");
        assert_eq!(value[0]["name"], "LivingRoom");
    }
}
