//! One verification, end to end: correlation keys out of the
//! environment, the manager's answer, the pure validation pipeline,
//! and on allow a single registry insert.
//!
//! Locking: the registry mutex covers only the insert. Manager lookups
//! run outside any lock, so concurrent verifications overlap their
//! round trips and serialize only on the registry write. (The narrow
//! critical section was chosen over locking the whole verify; the
//! concurrency test in `tests/supervisor.rs` exercises it.)

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::warn;

use fabric_gate_core::{
    validate_step, DenyReason, GateCfg, JobStepInfo, JobStepKey, LaunchRequest, LookupError,
    SchedulerClient, VerificationDecision,
};

use crate::registry::{JobDescriptor, JobRegistry, RegistryClosed};

pub struct VerificationGate {
    scheduler: Arc<dyn SchedulerClient + Send + Sync>,
    registry: Arc<JobRegistry>,
    cfg: GateCfg,
}

impl VerificationGate {
    pub fn new(
        scheduler: Arc<dyn SchedulerClient + Send + Sync>,
        registry: Arc<JobRegistry>,
        cfg: GateCfg,
    ) -> Self {
        Self {
            scheduler,
            registry,
            cfg,
        }
    }

    /// Verify one launch. Fail-closed: every path that is not a fully
    /// validated, registered launch returns a deny. Exactly one
    /// registry mutation happens on the allow path, none on deny.
    pub fn verify(&self, req: &LaunchRequest<'_>) -> VerificationDecision {
        let Some(key) = req.job_step_key() else {
            return self.deny(req, DenyReason::MissingCorrelationKeys);
        };

        let info = match self.lookup(key) {
            Ok(info) => info,
            Err(reason) => return self.deny(req, reason),
        };

        let admission = match validate_step(req.uid, key, &info, &self.cfg) {
            Ok(admission) => admission,
            Err(reason) => return self.deny(req, reason),
        };

        let desc = JobDescriptor {
            pid: req.pid,
            key: admission.key,
            block_id: admission.block_id.clone(),
            cnodes: admission.cnodes.clone(),
        };
        match self.registry.insert(desc) {
            Ok(None) => {}
            Ok(Some(stale)) => {
                // Pid reuse: the previous process with this pid was
                // never reported terminated. Overwrite and say so.
                warn!(
                    pid = req.pid,
                    stale_step = %stale.key,
                    step = %key,
                    "pid reused before termination was reported; replacing stale tracked job"
                );
            }
            Err(RegistryClosed) => return self.deny(req, DenyReason::GateClosed),
        }

        VerificationDecision::Allow(admission)
    }

    fn deny(&self, req: &LaunchRequest<'_>, reason: DenyReason) -> VerificationDecision {
        warn!(pid = req.pid, uid = req.uid, exe = %req.exe, %reason, "denying launch");
        VerificationDecision::Deny(reason)
    }

    /// Run the blocking lookup under the configured deadline. The
    /// in-flight query cannot be cancelled; on expiry the straggler
    /// result is discarded and the verification fails closed.
    fn lookup(&self, key: JobStepKey) -> Result<JobStepInfo, DenyReason> {
        let result = match self.cfg.lookup_timeout {
            None => self.scheduler.lookup_step(key),
            Some(deadline) => {
                let (tx, rx) = mpsc::channel();
                let scheduler = Arc::clone(&self.scheduler);
                thread::spawn(move || {
                    // Receiver may be gone if the deadline already expired.
                    let _ = tx.send(scheduler.lookup_step(key));
                });
                match rx.recv_timeout(deadline) {
                    Ok(result) => result,
                    Err(_) => Err(LookupError::Unavailable(format!(
                        "lookup for step {key} timed out after {deadline:?}"
                    ))),
                }
            }
        };

        result.map_err(|err| match err {
            LookupError::NotFound => DenyReason::StepNotFound { key },
            other => DenyReason::MetadataFetchFailed(other.to_string()),
        })
    }
}
