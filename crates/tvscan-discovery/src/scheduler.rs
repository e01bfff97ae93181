//! Bounded, deadline-aware fan-out of probe executions
//!
//! A scheduler owns a fixed number of permits. Each probe holds one permit
//! for its whole lifetime and the enumerating caller waits whenever all
//! permits are taken, so work is never queued without bound. Once the run
//! deadline passes no further probes are started; probes already running
//! finish on their own timeouts.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// One probe attempt: an address, plus a port for TCP probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    pub ip: Ipv4Addr,
    pub port: Option<u16>,
}

impl ProbeTarget {
    pub fn tcp(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port: Some(port) }
    }

    /// Port-less target used by ARP probing
    pub fn host(ip: Ipv4Addr) -> Self {
        Self { ip, port: None }
    }

    pub fn socket_addr(&self) -> Option<SocketAddrV4> {
        self.port.map(|port| SocketAddrV4::new(self.ip, port))
    }
}

/// Every (address, port) pair, addresses outermost
pub fn tcp_targets<'a, I>(addresses: I, ports: &'a [u16]) -> impl Iterator<Item = ProbeTarget> + 'a
where
    I: IntoIterator<Item = Ipv4Addr>,
    I::IntoIter: 'a,
{
    addresses
        .into_iter()
        .flat_map(move |ip| ports.iter().map(move |&port| ProbeTarget::tcp(ip, port)))
}

/// What a scheduler run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Probes started
    pub launched: usize,
    /// Enumeration stopped because the deadline passed
    pub deadline_hit: bool,
}

/// Fixed-size probe pool with a run deadline
#[derive(Debug, Clone)]
pub struct ProbeScheduler {
    permits: Arc<Semaphore>,
    max_workers: usize,
    deadline: Duration,
}

impl ProbeScheduler {
    /// A pool of `max_workers` permits (at least one); `deadline` is measured
    /// from the start of each [`run`](Self::run)
    pub fn new(max_workers: usize, deadline: Duration) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            deadline,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Permits not currently held by a probe
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Start `probe` for each target until targets run out or the deadline
    /// passes, then wait for every started probe to finish.
    pub async fn run<T, I, F, Fut>(&self, targets: I, mut probe: F) -> ScheduleReport
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + self.deadline;
        let mut tasks = JoinSet::new();
        let mut report = ScheduleReport::default();

        for target in targets {
            if Instant::now() >= deadline {
                report.deadline_hit = true;
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = sleep_until(deadline) => {
                    report.deadline_hit = true;
                    break;
                }
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = probe(target);
            tasks.spawn(async move {
                let _permit = permit;
                job.await;
            });
            report.launched += 1;

            // Reap finished tasks so the set stays proportional to the pool
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    warn!(error = %e, "Probe task failed");
                }
            }
        }

        if report.deadline_hit {
            debug!(
                launched = report.launched,
                in_flight = tasks.len(),
                "Deadline reached, no further probes scheduled"
            );
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Probe task failed");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_tcp_targets_addresses_outermost() {
        let ips = [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)];
        let targets: Vec<_> = tcp_targets(ips, &[80, 443]).collect();
        assert_eq!(
            targets,
            vec![
                ProbeTarget::tcp(ips[0], 80),
                ProbeTarget::tcp(ips[0], 443),
                ProbeTarget::tcp(ips[1], 80),
                ProbeTarget::tcp(ips[1], 443),
            ]
        );
        assert_eq!(targets[0].socket_addr(), Some(SocketAddrV4::new(ips[0], 80)));
        assert_eq!(ProbeTarget::host(ips[0]).socket_addr(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_target_without_exceeding_pool() {
        let scheduler = ProbeScheduler::new(4, Duration::from_secs(30));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let report = scheduler
            .run(0..100, |_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                let done = done.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    done.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(report, ScheduleReport { launched: 100, deadline_hit: false });
        assert_eq!(done.load(Ordering::SeqCst), 100);
        assert_eq!(peak.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_scheduling_and_bounds_run_time() {
        let probe_timeout = Duration::from_millis(150);
        let deadline = Duration::from_secs(1);
        let scheduler = ProbeScheduler::new(2, deadline);
        let started = Instant::now();

        let report = scheduler
            .run(0..10_000, |_| async move {
                // A backend that never answers, cut off by the probe timeout
                let _ = tokio::time::timeout(probe_timeout, std::future::pending::<()>()).await;
            })
            .await;

        assert!(report.deadline_hit);
        assert!(report.launched < 10_000);
        assert!(report.launched >= 2);
        assert!(started.elapsed() <= deadline + probe_timeout + Duration::from_millis(10));
        assert_eq!(scheduler.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_deadline_launches_nothing() {
        let scheduler = ProbeScheduler::new(8, Duration::ZERO);
        let report = scheduler.run(0..10, |_| async {}).await;
        assert_eq!(report, ScheduleReport { launched: 0, deadline_hit: true });
    }

    #[tokio::test]
    async fn test_panicking_probe_returns_its_permit() {
        let scheduler = ProbeScheduler::new(1, Duration::from_secs(5));
        let report = scheduler
            .run(0..3, |i| async move {
                if i == 1 {
                    panic!("probe blew up");
                }
            })
            .await;
        assert_eq!(report.launched, 3);
        assert_eq!(scheduler.available(), 1);
    }

    #[test]
    fn test_pool_size_is_at_least_one() {
        assert_eq!(ProbeScheduler::new(0, Duration::from_secs(1)).max_workers(), 1);
    }
}
