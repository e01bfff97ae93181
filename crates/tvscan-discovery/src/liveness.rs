//! TCP liveness probing

use crate::registry::LiveHostRegistry;
use crate::scheduler::ProbeTarget;
use crate::transport::ProbeTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::trace;

/// Default per-port connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(150);

/// Marks addresses alive when a monitored port accepts a connection
///
/// Failures of any kind mean "not alive on this port" and are never
/// reported to the caller.
#[derive(Clone)]
pub struct LivenessProber {
    transport: Arc<dyn ProbeTransport>,
    registry: Arc<LiveHostRegistry>,
    timeout: Duration,
}

impl LivenessProber {
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        registry: Arc<LiveHostRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<LiveHostRegistry> {
        &self.registry
    }

    /// Probe one (address, port) pair. Returns true if the port accepted.
    pub async fn probe(&self, target: ProbeTarget) -> bool {
        let Some(addr) = target.socket_addr() else {
            return false;
        };

        // The outer timeout holds even if a transport ignores its argument
        let alive = matches!(
            timeout(self.timeout, self.transport.connect(addr, self.timeout)).await,
            Ok(true)
        );

        if alive {
            self.registry.insert_if_absent(target.ip, target.port);
        } else {
            trace!(target = %addr, "No answer");
        }
        alive
    }
}
