//! Pure admission pipeline: given a request identity and the manager's
//! record for the step it claims to be, either produce an `Admission`
//! or the first `DenyReason` hit. No IO, no locking; the supervisor
//! crate wires this between the scheduler client and the registry.

use crate::cfg::GateCfg;
use crate::deny::{DenyReason, SubBlockField};
use crate::request::JobStepKey;
use crate::scheduler::JobStepInfo;
use crate::topology::{decode_corner, decode_shape, Corner, Shape};

/// Resolved sub-block placement for a step using fewer nodes than its
/// enclosing block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    pub corner: Corner,
    pub shape: Shape,
}

/// Everything an allow decision carries back to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    pub key: JobStepKey,
    pub block_id: String,
    pub cnodes: String,
    /// `Some` only for sub-block steps.
    pub placement: Option<Placement>,
}

/// Outcome of one verification.
#[derive(Clone, Debug, PartialEq)]
pub enum VerificationDecision {
    Allow(Admission),
    Deny(DenyReason),
}

impl VerificationDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, VerificationDecision::Allow(_))
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            VerificationDecision::Allow(_) => None,
            VerificationDecision::Deny(r) => Some(r),
        }
    }
}

/// Validate a step record against the requesting identity.
///
/// Checks run in a fixed order and short-circuit on the first failure:
/// ownership, node counts, sub-block placement, block-id sanity. The
/// caller has already resolved `key` from the environment and fetched
/// `info` from the manager.
pub fn validate_step(
    request_uid: u32,
    key: JobStepKey,
    info: &JobStepInfo,
    cfg: &GateCfg,
) -> Result<Admission, DenyReason> {
    // A user must not attach to another user's allocation.
    if info.owner_uid != request_uid {
        return Err(DenyReason::OwnershipMismatch {
            key,
            owner_uid: info.owner_uid,
            request_uid,
        });
    }

    if info.step_node_count == 0 || info.block_node_count == 0 {
        return Err(DenyReason::IncompleteNodeCounts {
            block_nodes: info.block_node_count,
            step_nodes: info.step_node_count,
        });
    }

    // A step on fewer nodes than its block must say exactly where in
    // the block it sits. Absence of either vector is a hard deny,
    // never a default placement.
    let placement = if info.step_node_count < info.block_node_count {
        let shape = match &info.geometry {
            Some(raw) => decode_shape(raw),
            None => {
                return Err(DenyReason::IncompleteSubBlockTopology {
                    key,
                    missing: SubBlockField::Shape,
                })
            }
        };
        let corner = match &info.start_corner {
            Some(raw) => decode_corner(raw),
            None => {
                return Err(DenyReason::IncompleteSubBlockTopology {
                    key,
                    missing: SubBlockField::Corner,
                })
            }
        };
        Some(Placement { corner, shape })
    } else {
        None
    };

    // Degenerate block ids mean the launch happened outside the
    // managed environment entirely.
    if info.block_id.is_empty() || info.block_id.len() < cfg.min_block_id_len {
        return Err(DenyReason::OutsideManagedEnvironment {
            block_id: info.block_id.clone(),
        });
    }

    Ok(Admission {
        key,
        block_id: info.block_id.clone(),
        cnodes: info.cnodes.clone(),
        placement,
    })
}
