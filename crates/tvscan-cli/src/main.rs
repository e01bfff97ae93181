//! tvscan - Main entry point
//!
//! Sweeps a subnet for smart-TV and streaming devices and exports what it
//! finds.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use tvscan_core::{DeviceRecord, JsonFileSink, RecordSink, SortOrder};
use tvscan_discovery::report::{write_reports, AdbCommand, DeviceReporter, DEFAULT_REPORT_FILE};
use tvscan_discovery::{ArpScanner, ScanConfig, ScanMode, ScanOutcome, TvScanner};

#[derive(Parser, Debug)]
#[command(name = "tvscan")]
#[command(about = "Local network scanner for smart TVs and streaming devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tvscan.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// TCP sweep and device classification
    Scan {
        #[command(flatten)]
        target: TargetArgs,
        /// Concurrent probes
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// ARP sweep mapping addresses to MAC addresses
    Arp {
        #[command(flatten)]
        target: TargetArgs,
        /// Interface handed to arping
        #[arg(short, long)]
        interface: Option<String>,
        /// Concurrent resolutions
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Detailed report for Chromecast and Android devices from a previous scan
    Report {
        /// Scan export to read
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Report file to write
        #[arg(short, long, default_value = DEFAULT_REPORT_FILE)]
        output: PathBuf,
        /// Also query Android properties over ADB
        #[arg(long)]
        adb: bool,
    },
    /// Write a default configuration file
    InitConfig,
}

#[derive(clap::Args, Debug, Default)]
struct TargetArgs {
    /// Three-octet network prefix (e.g., 192.168.1)
    #[arg(short, long, conflicts_with = "local")]
    prefix: Option<String>,
    /// Scan the subnet of the first non-loopback interface
    #[arg(long)]
    local: bool,
    /// Export file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Global deadline in seconds
    #[arg(short, long)]
    deadline: Option<u64>,
    /// Sort records by numeric address instead of string order
    #[arg(long)]
    numeric_sort: bool,
}

impl TargetArgs {
    fn apply(&self, scan: &mut ScanConfig) {
        if let Some(prefix) = &self.prefix {
            scan.prefix = prefix.clone();
            scan.mode = ScanMode::FixedPrefix;
        }
        if self.local {
            scan.mode = ScanMode::LocalSubnet;
        }
        if let Some(deadline) = self.deadline {
            scan.deadline_secs = deadline;
        }
        if self.numeric_sort {
            scan.sort_order = SortOrder::Numeric;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("tvscan v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig = args.command {
        config::save_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    let config = config::load_config(&args.config)?;
    let mut scan = config.to_scan_config();

    match args.command {
        Command::Scan { target, workers } => {
            target.apply(&mut scan);
            if let Some(workers) = workers {
                scan.max_workers = workers;
            }
            let output = target.output.unwrap_or_else(|| PathBuf::from(&config.output.path));
            run_scan(scan, output).await
        }
        Command::Arp {
            target,
            interface,
            workers,
        } => {
            target.apply(&mut scan);
            if interface.is_some() {
                scan.arp_interface = interface;
            }
            if let Some(workers) = workers {
                scan.arp_workers = workers;
            }
            let output = target.output.unwrap_or_else(|| PathBuf::from(&config.output.path));
            run_arp(scan, output).await
        }
        Command::Report { input, output, adb } => {
            let input = input.unwrap_or_else(|| PathBuf::from(&config.output.path));
            run_report(input, output, adb).await
        }
        Command::InitConfig => Ok(()),
    }
}

async fn run_scan(scan: ScanConfig, output: PathBuf) -> Result<()> {
    scan.validate()?;
    let range = scan.address_source()?.resolve()?;
    println!("Scanning {} addresses in {}", range.len(), range);

    let outcome = TvScanner::new(scan)?.scan(range).await;
    finish(outcome, output)
}

async fn run_arp(scan: ScanConfig, output: PathBuf) -> Result<()> {
    scan.validate()?;
    let range = scan.address_source()?.resolve()?;
    let scanner = ArpScanner::new(scan)?;
    println!("Resolving {} addresses in {}", range.len(), range);

    let outcome = scanner.scan(range).await?;
    finish(outcome, output)
}

/// Export and print; the listing is shown even when the export fails
fn finish(outcome: ScanOutcome, output: PathBuf) -> Result<()> {
    if outcome.stats.deadline_hit {
        println!(
            "Deadline reached: {} probes not scheduled",
            outcome.stats.skipped_by_deadline
        );
    }

    let sink = JsonFileSink::new(&output);
    let exported = sink.write(&outcome.records);

    match &exported {
        Ok(()) => println!("TVs detected: {}", outcome.records.len()),
        Err(e) => println!("Error exporting: {}", e),
    }
    print_records(&outcome.records);

    exported.with_context(|| format!("Failed to export to {}", output.display()))?;
    println!("Saved to {}", output.display());
    Ok(())
}

fn print_records(records: &[DeviceRecord]) {
    for record in records {
        println!(
            "  - {} [{}] {} ({})",
            record.ip, record.brand, record.name, record.status
        );
    }
}

async fn run_report(input: PathBuf, output: PathBuf, adb: bool) -> Result<()> {
    let records = JsonFileSink::load(&input)
        .with_context(|| format!("Failed to read scan results from {}", input.display()))?;

    let mut reporter = DeviceReporter::networked()?;
    if adb {
        reporter = reporter.with_adb(std::sync::Arc::new(AdbCommand::default()));
    }

    let reports = reporter.report_all(&records).await;
    write_reports(&output, &reports)?;

    info!("Scan complete! See '{}'", output.display());
    println!("Reported on {} devices, saved to {}", reports.len(), output.display());
    Ok(())
}
