//! Scan orchestration: sweep, classify, sort

use crate::arp::{ArpError, MacAddress, MacResolver, SystemMacResolver};
use crate::classify::Classifier;
use crate::config::ScanConfig;
use crate::error::DiscoveryError;
use crate::liveness::LivenessProber;
use crate::registry::LiveHostRegistry;
use crate::scheduler::{tcp_targets, ProbeScheduler, ProbeTarget};
use crate::transport::{NetTransport, ProbeTransport};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};
use tvscan_core::{sort_records, Brand, DeviceRecord, DeviceStatus};

/// Counters describing one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Candidate addresses offered by the address source
    pub candidates: u64,
    /// Probes started
    pub scheduled: usize,
    /// Probes never started because the deadline passed
    pub skipped_by_deadline: u64,
    pub deadline_hit: bool,
    /// Unique addresses found alive
    pub live_hosts: usize,
}

/// Sorted records plus the sweep counters that produced them
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub records: Vec<DeviceRecord>,
    pub stats: SweepStats,
}

/// TCP sweep followed by device classification
pub struct TvScanner {
    config: ScanConfig,
    transport: Arc<dyn ProbeTransport>,
}

impl TvScanner {
    /// Scanner on the real network
    pub fn new(config: ScanConfig) -> Result<Self, DiscoveryError> {
        Ok(Self::with_transport(config, Arc::new(NetTransport::new()?)))
    }

    pub fn with_transport(config: ScanConfig, transport: Arc<dyn ProbeTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Probe every (address, port) pair and collect the addresses that
    /// answered on at least one port
    pub async fn sweep<I>(&self, addresses: I) -> (Arc<LiveHostRegistry>, SweepStats)
    where
        I: IntoIterator<Item = Ipv4Addr>,
        I::IntoIter: ExactSizeIterator,
    {
        let addresses = addresses.into_iter();
        let candidates = addresses.len() as u64;
        let total = candidates * self.config.ports.len() as u64;

        let registry = Arc::new(LiveHostRegistry::new());
        let prober = LivenessProber::new(
            self.transport.clone(),
            registry.clone(),
            self.config.connect_timeout(),
        );
        let scheduler = ProbeScheduler::new(self.config.max_workers, self.config.deadline());

        info!(
            candidates = candidates,
            ports = self.config.ports.len(),
            workers = scheduler.max_workers(),
            "Starting TCP sweep"
        );

        let report = scheduler
            .run(tcp_targets(addresses, &self.config.ports), |target| {
                let prober = prober.clone();
                async move {
                    prober.probe(target).await;
                }
            })
            .await;

        let stats = SweepStats {
            candidates,
            scheduled: report.launched,
            skipped_by_deadline: total.saturating_sub(report.launched as u64),
            deadline_hit: report.deadline_hit,
            live_hosts: registry.len(),
        };

        if stats.deadline_hit {
            warn!(
                skipped = stats.skipped_by_deadline,
                "Sweep deadline reached before all probes were scheduled"
            );
        }
        info!(live = stats.live_hosts, probes = stats.scheduled, "TCP sweep complete");

        (registry, stats)
    }

    /// Classify each address exactly once. Order of the result is unspecified.
    pub async fn classify_hosts(&self, hosts: Vec<Ipv4Addr>) -> Vec<DeviceRecord> {
        let classifier = Arc::new(Classifier::standard(
            self.transport.clone(),
            &self.config.classifier_config(),
        ));
        let permits = Arc::new(Semaphore::new(self.config.classify_workers.max(1)));
        let mut tasks = JoinSet::new();

        for ip in hosts {
            let classifier = classifier.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                Some(classifier.classify(ip).await)
            });
        }

        let mut records = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Classification task failed"),
            }
        }
        records
    }

    /// Full run: sweep, classify the live hosts, sort
    pub async fn scan<I>(&self, addresses: I) -> ScanOutcome
    where
        I: IntoIterator<Item = Ipv4Addr>,
        I::IntoIter: ExactSizeIterator,
    {
        let (registry, stats) = self.sweep(addresses).await;

        let hosts: Vec<Ipv4Addr> = registry.snapshot().into_iter().map(|h| h.ip).collect();
        let mut records = self.classify_hosts(hosts).await;
        sort_records(&mut records, self.config.sort_order);

        info!("Scan complete: {} devices found", records.len());
        ScanOutcome { records, stats }
    }
}

/// Sweep that maps live addresses to hardware addresses
pub struct ArpScanner {
    config: ScanConfig,
    resolver: Arc<dyn MacResolver>,
}

impl ArpScanner {
    /// Scanner using the platform's ARP tooling
    pub fn new(config: ScanConfig) -> Result<Self, DiscoveryError> {
        let resolver = SystemMacResolver::new(config.arp_interface.clone()).map_err(|e| match e {
            ArpError::UnsupportedPlatform(os) => DiscoveryError::UnsupportedPlatform(os),
            other => DiscoveryError::InvalidConfig(other.to_string()),
        })?;
        Ok(Self::with_resolver(config, Arc::new(resolver)))
    }

    pub fn with_resolver(config: ScanConfig, resolver: Arc<dyn MacResolver>) -> Self {
        Self { config, resolver }
    }

    pub async fn scan<I>(&self, addresses: I) -> Result<ScanOutcome, DiscoveryError>
    where
        I: IntoIterator<Item = Ipv4Addr>,
        I::IntoIter: ExactSizeIterator,
    {
        let addresses = addresses.into_iter();
        let candidates = addresses.len() as u64;

        let macs: Arc<Mutex<HashMap<Ipv4Addr, MacAddress>>> = Arc::new(Mutex::new(HashMap::new()));
        let fatal: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let abort = Arc::new(AtomicBool::new(false));
        let scheduler = ProbeScheduler::new(self.config.arp_workers, self.config.deadline());

        info!(candidates = candidates, workers = scheduler.max_workers(), "Starting ARP sweep");

        let report = scheduler
            .run(addresses.map(ProbeTarget::host), |target| {
                let resolver = self.resolver.clone();
                let macs = macs.clone();
                let fatal = fatal.clone();
                let abort = abort.clone();
                async move {
                    if abort.load(Ordering::Relaxed) {
                        return;
                    }
                    match resolver.resolve_mac(target.ip).await {
                        Ok(mac) => {
                            macs.lock().await.insert(target.ip, mac);
                        }
                        Err(ArpError::UnsupportedPlatform(os)) => {
                            abort.store(true, Ordering::Relaxed);
                            let mut fatal = fatal.lock().await;
                            if fatal.is_none() {
                                *fatal = Some(os);
                            }
                        }
                        Err(e) => trace!(ip = %target.ip, error = %e, "No ARP answer"),
                    }
                }
            })
            .await;

        if let Some(os) = fatal.lock().await.take() {
            return Err(DiscoveryError::UnsupportedPlatform(os));
        }

        let macs = std::mem::take(&mut *macs.lock().await);
        let mut records: Vec<DeviceRecord> = macs
            .into_iter()
            .map(|(ip, mac)| {
                DeviceRecord::new(ip, "", Brand::Hardware(mac.to_string()), DeviceStatus::Detected)
            })
            .collect();
        sort_records(&mut records, self.config.sort_order);

        let stats = SweepStats {
            candidates,
            scheduled: report.launched,
            skipped_by_deadline: candidates.saturating_sub(report.launched as u64),
            deadline_hit: report.deadline_hit,
            live_hosts: records.len(),
        };
        debug!(?stats, "ARP sweep stats");
        info!("ARP sweep complete: {} hosts answered", records.len());

        Ok(ScanOutcome { records, stats })
    }
}
