//! Start/terminate notifications from the host launcher.
//!
//! These never talk to the resource manager; they only take the
//! registry lock for their own lookup/removal, so they can never block
//! on manager latency.

use std::sync::Arc;

use tracing::{debug, info, warn};

use fabric_gate_core::{compact_location, TOPOLOGY_DIMS};

use crate::registry::{JobRegistry, RegistryClosed};

/// One node the launcher reported as failed during the step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedNode {
    pub coords: [u32; TOPOLOGY_DIMS],
    /// Human-readable location label from the launcher.
    pub location: String,
}

impl FailedNode {
    /// Fixed-width digit form of the coordinates, dimension order
    /// preserved.
    pub fn compact_location(&self) -> String {
        compact_location(&self.coords)
    }
}

/// What the launcher tells us when a tracked process goes away.
#[derive(Clone, Debug, Default)]
pub struct TerminationEvent {
    pub pid: u32,
    pub kill_timeout: bool,
    pub failed_nodes: Vec<FailedNode>,
    pub message: Option<String>,
}

pub struct LifecycleTracker {
    registry: Arc<JobRegistry>,
}

impl LifecycleTracker {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Informational only; the descriptor was already registered by
    /// the verify that admitted this process.
    pub fn on_started(&self, pid: u32, launcher_job_id: u64) {
        debug!(pid, launcher_job_id, "launched process started");
    }

    /// Correlate a termination with the tracked launch and drop it.
    /// Diagnostics in priority order: kill timeout, failed nodes,
    /// free-text message.
    pub fn on_terminated(&self, event: &TerminationEvent) {
        let desc = match self.registry.remove_by_pid(event.pid) {
            // Expected during teardown: the registry was drained first.
            Err(RegistryClosed) => return,
            Ok(None) => {
                warn!(pid = event.pid, "no matching tracked job for this process");
                return;
            }
            Ok(Some(desc)) => desc,
        };

        if event.kill_timeout {
            warn!(step = %desc.key, "step hit its kill timeout");
        } else if !event.failed_nodes.is_empty() {
            warn!(
                step = %desc.key,
                failed = event.failed_nodes.len(),
                "step had node failures"
            );
            for node in &event.failed_nodes {
                warn!(
                    step = %desc.key,
                    location = %node.location,
                    coords = ?node.coords,
                    compact = %node.compact_location(),
                    "failed node"
                );
            }
        } else if let Some(message) = &event.message {
            info!(
                step = %desc.key,
                cnodes = %desc.cnodes,
                %message,
                "step terminated with a message"
            );
        }
    }
}
