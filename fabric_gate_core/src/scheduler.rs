//! Query contract against the external cluster resource manager.
//!
//! One `lookup_step` call is the whole exchange: either the manager
//! hands back a complete `JobStepInfo` record or the call fails. There
//! is no partial result; an implementation that has to assemble the
//! record from several round trips must fail the call if any of them
//! fails.

use thiserror::Error;

use crate::request::JobStepKey;
use crate::topology::RawTopology;

/// Manager-authoritative record for one job step.
///
/// `geometry` and `start_corner` are only populated for sub-block
/// allocations; whole-block steps leave them `None` and the gate never
/// consults them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobStepInfo {
    pub owner_uid: u32,
    pub block_id: String,
    /// Opaque ionode/cnode membership descriptor.
    pub cnodes: String,
    pub block_node_count: u32,
    pub step_node_count: u32,
    pub geometry: Option<RawTopology>,
    pub start_corner: Option<RawTopology>,
}

/// Why a lookup produced no record. `NotFound` is an authoritative
/// answer from the manager; the other two mean the manager (or one of
/// its fields) could not be reached and the caller must fail closed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("manager has no matching job step")]
    NotFound,

    #[error("resource manager unavailable: {0}")]
    Unavailable(String),

    #[error("resource manager could not provide the {0} field")]
    FieldUnavailable(&'static str),
}

/// Blocking query interface to the resource manager.
///
/// No timeout or retry is built in; callers own both. The supervisor
/// crate wraps calls in a deadline that resolves to deny on expiry.
pub trait SchedulerClient {
    fn lookup_step(&self, key: JobStepKey) -> Result<JobStepInfo, LookupError>;
}
