//! fabric_gate_supervisor
//!
//! Outside-world facing orchestration layer for `fabric_gate_core`.
//!
//! Responsibilities:
//! - own the registry of tracked launches (one mutex, whole map)
//! - run one verification end to end (keys, lookup, validate, insert)
//! - apply the lookup deadline around the blocking manager query
//! - consume start/terminate notifications and emit diagnostics
//!
//! Non-goals:
//! - no async
//! - no scheduling policy (the resource manager owns that)
//! - no process management (the host launcher owns that)

pub mod registry;
pub mod gate;
pub mod lifecycle;

pub use registry::{JobDescriptor, JobRegistry, RegistryClosed};
pub use gate::VerificationGate;
pub use lifecycle::{FailedNode, LifecycleTracker, TerminationEvent};
