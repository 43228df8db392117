//! Concurrency-safe store of tracked launches.
//!
//! One mutex guards the whole map; cardinality is bounded by the number
//! of concurrently launching processes, so per-entry locking buys
//! nothing. After `drain_and_close` every operation reports
//! `RegistryClosed` instead of panicking, which lets late lifecycle
//! callbacks land harmlessly during teardown.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::info;

use fabric_gate_core::JobStepKey;

/// Registry entry created on an allow decision and destroyed when the
/// process is reported terminated.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobDescriptor {
    pub pid: u32,
    pub key: JobStepKey,
    pub block_id: String,
    pub cnodes: String,
}

/// The registry has been drained and closed; the gate is shutting down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("job registry is closed")]
pub struct RegistryClosed;

#[derive(Debug)]
pub struct JobRegistry {
    // None once closed.
    entries: Mutex<Option<HashMap<u32, JobDescriptor>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        info!("launch tracking registry initialized");
        Self {
            entries: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Track a launch. Returns any stale descriptor that was still
    /// registered under the same pid (pid-reuse policy: overwrite, let
    /// the caller warn).
    pub fn insert(&self, desc: JobDescriptor) -> Result<Option<JobDescriptor>, RegistryClosed> {
        let mut guard = self.entries.lock().expect("job registry mutex poisoned");
        let entries = guard.as_mut().ok_or(RegistryClosed)?;
        Ok(entries.insert(desc.pid, desc))
    }

    /// Atomically find and remove the entry for `pid`.
    pub fn remove_by_pid(&self, pid: u32) -> Result<Option<JobDescriptor>, RegistryClosed> {
        let mut guard = self.entries.lock().expect("job registry mutex poisoned");
        let entries = guard.as_mut().ok_or(RegistryClosed)?;
        Ok(entries.remove(&pid))
    }

    /// Remove everything and close the registry. Subsequent operations
    /// report `RegistryClosed`. Returns the drained descriptors sorted
    /// by pid so teardown diagnostics are deterministic.
    pub fn drain_and_close(&self) -> Vec<JobDescriptor> {
        let mut guard = self.entries.lock().expect("job registry mutex poisoned");
        let mut drained: Vec<JobDescriptor> = match guard.take() {
            Some(entries) => entries.into_values().collect(),
            None => Vec::new(),
        };
        drained.sort_by_key(|d| d.pid);
        info!(drained = drained.len(), "launch tracking registry drained and closed");
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.entries
            .lock()
            .expect("job registry mutex poisoned")
            .is_none()
    }

    /// Number of tracked launches; 0 once closed.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("job registry mutex poisoned")
            .as_ref()
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
