//! Device identification by an ordered decision list
//!
//! Rules are tried strictly in order and the first one that produces a
//! record wins. There is no scoring and no combination of evidence across
//! rules. An address that matches nothing is reported as an unknown device
//! that was only seen to be reachable.

use crate::transport::ProbeTransport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, trace};
use tvscan_core::{Brand, DeviceRecord, DeviceStatus};

/// Name given to devices no rule identified
pub const FALLBACK_NAME: &str = "Smart TV";

/// Endpoints and ports the standard rules look at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub chromecast_port: u16,
    pub chromecast_path: String,
    pub roku_port: u16,
    pub roku_path: String,
    /// Substring a Roku device-info body must contain
    pub roku_marker: String,
    pub lg_ports: Vec<u16>,
    pub samsung_ports: Vec<u16>,
    pub adb_port: u16,
    /// Timeout for HTTP identification requests
    pub request_timeout_ms: u64,
    /// Timeout for bare TCP checks; the scan's liveness timeout when unset
    pub connect_timeout_ms: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            chromecast_port: 8008,
            chromecast_path: "/setup/eureka_info".to_string(),
            roku_port: 8060,
            roku_path: "/query/device-info".to_string(),
            roku_marker: "<device-info".to_string(),
            lg_ports: vec![3000, 3001, 3002],
            samsung_ports: vec![7676, 8001, 8002],
            adb_port: 5555,
            request_timeout_ms: 1000,
            connect_timeout_ms: None,
        }
    }
}

impl ClassifierConfig {
    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn connect_timeout(&self) -> Duration {
        self.connect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::liveness::CONNECT_TIMEOUT)
    }
}

/// One entry of the decision list: tests for a device signature and
/// produces the record when it matches
#[async_trait]
pub trait ClassificationRule: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, ip: Ipv4Addr, transport: &dyn ProbeTransport) -> Option<DeviceRecord>;
}

/// Chromecast eureka_info endpoint answering 200 with a JSON document
pub struct ChromecastRule {
    port: u16,
    path: String,
    timeout: Duration,
}

impl ChromecastRule {
    pub fn new(port: u16, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            port,
            path: path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ClassificationRule for ChromecastRule {
    fn name(&self) -> &str {
        "chromecast"
    }

    async fn evaluate(&self, ip: Ipv4Addr, transport: &dyn ProbeTransport) -> Option<DeviceRecord> {
        let url = format!("http://{}:{}{}", ip, self.port, self.path);
        let reply = get(transport, &url, self.timeout).await?;
        if reply.status != 200 {
            trace!(ip = %ip, status = reply.status, "Eureka endpoint did not answer 200");
            return None;
        }

        // Any JSON object identifies the device; a missing or non-string
        // name leaves it empty
        match serde_json::from_str::<Value>(&reply.body) {
            Ok(Value::Object(info)) => {
                let name = info.get("name").and_then(Value::as_str).unwrap_or_default();
                Some(DeviceRecord::active(ip, name, Brand::Chromecast))
            }
            Ok(Value::Null) => Some(DeviceRecord::active(ip, "", Brand::Chromecast)),
            Ok(other) => {
                debug!(ip = %ip, body = %other, "eureka_info is not a JSON object");
                None
            }
            Err(e) => {
                debug!(ip = %ip, error = %e, "Malformed eureka_info body");
                None
            }
        }
    }
}

/// Roku ECP device-info endpoint
pub struct RokuRule {
    port: u16,
    path: String,
    marker: String,
    timeout: Duration,
}

impl RokuRule {
    pub fn new(port: u16, path: impl Into<String>, marker: impl Into<String>, timeout: Duration) -> Self {
        Self {
            port,
            path: path.into(),
            marker: marker.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ClassificationRule for RokuRule {
    fn name(&self) -> &str {
        "roku"
    }

    async fn evaluate(&self, ip: Ipv4Addr, transport: &dyn ProbeTransport) -> Option<DeviceRecord> {
        let url = format!("http://{}:{}{}", ip, self.port, self.path);
        let reply = get(transport, &url, self.timeout).await?;
        if reply.status == 200 && reply.body.contains(&self.marker) {
            Some(DeviceRecord::active(ip, "Roku TV", Brand::Roku))
        } else {
            None
        }
    }
}

/// Any of a set of ports accepting a TCP connection
pub struct PortRule {
    name: String,
    brand: Brand,
    label: String,
    ports: Vec<u16>,
    timeout: Duration,
}

impl PortRule {
    pub fn new(
        name: impl Into<String>,
        brand: Brand,
        label: impl Into<String>,
        ports: Vec<u16>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            brand,
            label: label.into(),
            ports,
            timeout,
        }
    }
}

#[async_trait]
impl ClassificationRule for PortRule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ip: Ipv4Addr, transport: &dyn ProbeTransport) -> Option<DeviceRecord> {
        for &port in &self.ports {
            let addr = SocketAddrV4::new(ip, port);
            if let Ok(true) = timeout(self.timeout, transport.connect(addr, self.timeout)).await {
                return Some(DeviceRecord::active(ip, self.label.clone(), self.brand.clone()));
            }
        }
        None
    }
}

async fn get(
    transport: &dyn ProbeTransport,
    url: &str,
    limit: Duration,
) -> Option<crate::transport::HttpReply> {
    match timeout(limit, transport.http_get(url, limit)).await {
        Ok(Ok(reply)) => Some(reply),
        Ok(Err(e)) => {
            trace!(url = %url, error = %e, "Identification request failed");
            None
        }
        Err(_) => {
            trace!(url = %url, "Identification request timed out");
            None
        }
    }
}

/// Runs the decision list against live addresses
pub struct Classifier {
    transport: Arc<dyn ProbeTransport>,
    rules: Vec<Box<dyn ClassificationRule>>,
}

impl Classifier {
    /// Classifier over an explicit rule list, evaluated in the order given
    pub fn new(transport: Arc<dyn ProbeTransport>, rules: Vec<Box<dyn ClassificationRule>>) -> Self {
        Self { transport, rules }
    }

    /// Chromecast, Roku, LG webOS, Samsung, then Android/Fire TV over ADB
    pub fn standard(transport: Arc<dyn ProbeTransport>, config: &ClassifierConfig) -> Self {
        let request = config.request_timeout();
        let connect = config.connect_timeout();
        let rules: Vec<Box<dyn ClassificationRule>> = vec![
            Box::new(ChromecastRule::new(
                config.chromecast_port,
                config.chromecast_path.clone(),
                request,
            )),
            Box::new(RokuRule::new(
                config.roku_port,
                config.roku_path.clone(),
                config.roku_marker.clone(),
                request,
            )),
            Box::new(PortRule::new("lg-webos", Brand::LgWebOs, "LG TV", config.lg_ports.clone(), connect)),
            Box::new(PortRule::new(
                "samsung",
                Brand::Samsung,
                "Samsung TV",
                config.samsung_ports.clone(),
                connect,
            )),
            Box::new(PortRule::new(
                "adb",
                Brand::AndroidFireTv,
                "ADB Device",
                vec![config.adb_port],
                connect,
            )),
        ];
        Self::new(transport, rules)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Identify one address; always yields a record
    pub async fn classify(&self, ip: Ipv4Addr) -> DeviceRecord {
        for rule in &self.rules {
            if let Some(record) = rule.evaluate(ip, self.transport.as_ref()).await {
                info!(ip = %ip, brand = %record.brand, name = %record.name, rule = rule.name(), "Identified device");
                return record;
            }
            debug!(ip = %ip, rule = rule.name(), "Rule did not match");
        }
        DeviceRecord::new(ip, FALLBACK_NAME, Brand::Unknown, DeviceStatus::Detected)
    }
}
