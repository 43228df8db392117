//! Launch request model and job/step correlation-key extraction.
//!
//! A `LaunchRequest` is a read-only snapshot of what the host launcher
//! knows about a process it is about to start. The gate never mutates
//! it; it only scans the environment for the two correlation keys the
//! managed launch path is required to export.

use std::borrow::Cow;
use std::fmt;

/// Environment key holding the manager-assigned job id.
pub const ENV_JOB_ID: &str = "FABRIC_JOB_ID";
/// Environment key holding the manager-assigned step id.
pub const ENV_STEP_ID: &str = "FABRIC_STEP_ID";

/// Manager-assigned (job, step) identity pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct JobStepKey {
    pub job_id: u32,
    pub step_id: u32,
}

impl fmt::Display for JobStepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job_id, self.step_id)
    }
}

/// A launch the host is asking the gate to admit.
///
/// `pid` is opaque and assumed unique for the lifetime overlap of
/// concurrently tracked launches; see the registry's pid-reuse policy.
#[derive(Clone, Debug)]
pub struct LaunchRequest<'a> {
    pub pid: u32,
    pub uid: u32,
    pub exe: Cow<'a, str>,
    pub args: Vec<Cow<'a, str>>,
    pub envs: Vec<(Cow<'a, str>, Cow<'a, str>)>,
}

impl<'a> LaunchRequest<'a> {
    pub fn new(pid: u32, uid: u32, exe: impl Into<Cow<'a, str>>) -> Self {
        Self {
            pid,
            uid,
            exe: exe.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<Cow<'a, str>>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(
        mut self,
        key: impl Into<Cow<'a, str>>,
        value: impl Into<Cow<'a, str>>,
    ) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Scan the environment for both correlation keys.
    ///
    /// Both keys must be present and parse as non-negative integers or
    /// the request cannot be correlated with any manager state. Only
    /// the first occurrence of each key is consulted; an unparsable
    /// value there makes the key count as missing, a later duplicate
    /// cannot repair it. The scan stops once both keys have been seen.
    pub fn job_step_key(&self) -> Option<JobStepKey> {
        let mut job_id: Option<u32> = None;
        let mut step_id: Option<u32> = None;
        let mut seen_job = false;
        let mut seen_step = false;

        for (key, value) in &self.envs {
            if key.as_ref() == ENV_JOB_ID && !seen_job {
                seen_job = true;
                job_id = value.parse().ok();
            } else if key.as_ref() == ENV_STEP_ID && !seen_step {
                seen_step = true;
                step_id = value.parse().ok();
            }
            if seen_job && seen_step {
                break;
            }
        }

        Some(JobStepKey {
            job_id: job_id?,
            step_id: step_id?,
        })
    }
}
