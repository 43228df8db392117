pub mod topology;
pub mod request;

pub mod scheduler;
pub mod deny;
pub mod cfg;
pub mod admit;

pub use topology::{compact_location, decode_corner, decode_shape, Corner, RawTopology, Shape, TOPOLOGY_DIMS};
pub use request::{JobStepKey, LaunchRequest, ENV_JOB_ID, ENV_STEP_ID};

pub use scheduler::{JobStepInfo, LookupError, SchedulerClient};
pub use deny::{DenyReason, SubBlockField};
pub use cfg::GateCfg;
pub use admit::{validate_step, Admission, Placement, VerificationDecision};
