//! Deny-reason taxonomy.
//!
//! Every way a verification can fail maps to exactly one of these
//! variants. They are operator-facing: the Display text is what ends up
//! in the host's logs, so each message names the ids involved.

use thiserror::Error;

use crate::request::JobStepKey;

/// Why a launch was denied. The gate is fail-closed: anything it cannot
/// positively verify resolves to one of these, never to an allow.
#[derive(Clone, Debug, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DenyReason {
    #[error("launch environment is missing the job/step correlation keys")]
    MissingCorrelationKeys,

    #[error("no job step matches {key}")]
    StepNotFound { key: JobStepKey },

    #[error("step {key} belongs to uid {owner_uid} but uid {request_uid} is trying to run it")]
    OwnershipMismatch {
        key: JobStepKey,
        owner_uid: u32,
        request_uid: u32,
    },

    #[error("resource manager metadata fetch failed: {0}")]
    MetadataFetchFailed(String),

    #[error("incomplete node counts: step={step_nodes} block={block_nodes}")]
    IncompleteNodeCounts { block_nodes: u32, step_nodes: u32 },

    #[error("sub-block step {key} has no {missing}")]
    IncompleteSubBlockTopology { key: JobStepKey, missing: SubBlockField },

    #[error("block id {block_id:?} did not come from a managed allocation")]
    OutsideManagedEnvironment { block_id: String },

    #[error("gate is shut down")]
    GateClosed,
}

/// Which half of the sub-block placement was missing. Reported
/// separately so operators can tell a missing shape from a missing
/// corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SubBlockField {
    Shape,
    Corner,
}

impl std::fmt::Display for SubBlockField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubBlockField::Shape => f.write_str("shape"),
            SubBlockField::Corner => f.write_str("corner"),
        }
    }
}
