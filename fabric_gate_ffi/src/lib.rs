#![allow(clippy::missing_safety_doc)]

//! C ABI plugin surface for the launch gate.
//!
//! The host launcher loads this as a shared object and drives it
//! through three entry points (verify / started / terminated), exactly
//! one handle per plugin lifetime. The resource-manager query is
//! supplied by the host as a callback so the gate stays free of any
//! wire protocol.

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use fabric_gate_core::{
    DenyReason, GateCfg, JobStepInfo, JobStepKey, LaunchRequest, LookupError, SchedulerClient,
    VerificationDecision, TOPOLOGY_DIMS,
};
use fabric_gate_supervisor::{
    FailedNode, JobRegistry, LifecycleTracker, TerminationEvent, VerificationGate,
};

/// FFI ABI version for fabric_gate_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function
/// signature changes.
pub const FABRIC_GATE_FFI_VERSION: u32 = 1;

#[no_mangle]
pub extern "C" fn fabric_gate_ffi_version() -> u32 {
    FABRIC_GATE_FFI_VERSION
}

/// FFI string view (UTF-8 bytes). A null pointer means "absent".
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl FgStr {
    pub const fn null() -> Self {
        Self { ptr: ptr::null(), len: 0 }
    }

    fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).ok()
    }
}

/// One environment key/value pair.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgKv {
    pub key: FgStr,
    pub val: FgStr,
}

/// FFI input: the launch the host wants verified.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgLaunchRequest {
    pub pid: u32,
    pub uid: u32,
    pub exe: FgStr,
    pub args_ptr: *const FgStr,
    pub args_len: usize,
    pub envs_ptr: *const FgKv,
    pub envs_len: usize,
}

/// Job-step record the host's lookup callback fills in.
///
/// String views must stay valid until the callback's caller returns;
/// the gate copies them immediately.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgStepInfo {
    pub owner_uid: u32,
    pub block_id: FgStr,
    pub cnodes: FgStr,
    pub block_node_count: u32,
    pub step_node_count: u32,
    pub has_geometry: u8,
    pub geometry: [u16; TOPOLOGY_DIMS],
    pub has_corner: u8,
    pub corner: [u16; TOPOLOGY_DIMS],
}

impl FgStepInfo {
    const fn empty() -> Self {
        Self {
            owner_uid: 0,
            block_id: FgStr::null(),
            cnodes: FgStr::null(),
            block_node_count: 0,
            step_node_count: 0,
            has_geometry: 0,
            geometry: [0; TOPOLOGY_DIMS],
            has_corner: 0,
            corner: [0; TOPOLOGY_DIMS],
        }
    }
}

/// Host-supplied lookup callback.
///
/// Return codes: 0 = record filled in, 1 = no matching step, any
/// negative value = manager unavailable. May be invoked from a helper
/// thread when a lookup deadline is configured, so it must be
/// thread-safe with respect to `user_data`.
pub type FgLookupFn =
    unsafe extern "C" fn(user_data: *mut c_void, job_id: u32, step_id: u32, out: *mut FgStepInfo) -> i32;

/// Deny reason as a C-friendly enum. `None` is only ever seen inside
/// an allow decision.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FgDenyReason {
    None = 0,
    MissingCorrelationKeys = 1,
    StepNotFound = 2,
    OwnershipMismatch = 3,
    MetadataFetchFailed = 4,
    IncompleteNodeCounts = 5,
    IncompleteSubBlockTopology = 6,
    OutsideManagedEnvironment = 7,
    GateClosed = 8,
}

/// Owned byte buffer handed to the host; freed with
/// `fabric_gate_bytes_free`.
#[repr(C)]
pub struct FgBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl FgBytes {
    const fn null() -> Self {
        Self { ptr: ptr::null_mut(), len: 0 }
    }

    fn from_string(s: String) -> Self {
        let mut boxed = s.into_bytes().into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        Self { ptr, len }
    }
}

/// FFI output: populated by `fabric_gate_verify`. On allow, `block_id`
/// and `cnodes` are owned buffers the host must release with
/// `fabric_gate_decision_free`; on deny they are null.
#[repr(C)]
pub struct FgDecision {
    pub allow: u8,
    pub deny_reason: FgDenyReason,
    pub has_placement: u8,
    pub corner: [u32; TOPOLOGY_DIMS],
    pub shape: [u32; TOPOLOGY_DIMS],
    pub block_id: FgBytes,
    pub cnodes: FgBytes,
}

impl FgDecision {
    const fn deny(reason: FgDenyReason) -> Self {
        Self {
            allow: 0,
            deny_reason: reason,
            has_placement: 0,
            corner: [0; TOPOLOGY_DIMS],
            shape: [0; TOPOLOGY_DIMS],
            block_id: FgBytes::null(),
            cnodes: FgBytes::null(),
        }
    }
}

/// One failed node in a termination notification.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgFailedNode {
    pub coords: [u32; TOPOLOGY_DIMS],
    pub location: FgStr,
}

/// FFI input: termination notification.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgTerminated {
    pub pid: u32,
    pub kill_timeout: u8,
    pub message: FgStr,
    pub nodes_ptr: *const FgFailedNode,
    pub nodes_len: usize,
}

/// Gate cfg for FFI (keep it minimal).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FgCfg {
    /// Lookup deadline in milliseconds; -1 means no deadline.
    pub lookup_timeout_ms: i64,
    pub min_block_id_len: u32,
}

#[no_mangle]
pub extern "C" fn fabric_gate_cfg_default() -> FgCfg {
    let d = GateCfg::default();
    FgCfg {
        lookup_timeout_ms: d
            .lookup_timeout
            .map(|t| t.as_millis() as i64)
            .unwrap_or(-1),
        min_block_id_len: d.min_block_id_len as u32,
    }
}

fn cfg_from_ffi(c: FgCfg) -> GateCfg {
    GateCfg {
        lookup_timeout: if c.lookup_timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(c.lookup_timeout_ms as u64))
        },
        min_block_id_len: c.min_block_id_len as usize,
    }
}

fn deny_to_ffi(r: &DenyReason) -> FgDenyReason {
    match r {
        DenyReason::MissingCorrelationKeys => FgDenyReason::MissingCorrelationKeys,
        DenyReason::StepNotFound { .. } => FgDenyReason::StepNotFound,
        DenyReason::OwnershipMismatch { .. } => FgDenyReason::OwnershipMismatch,
        DenyReason::MetadataFetchFailed(_) => FgDenyReason::MetadataFetchFailed,
        DenyReason::IncompleteNodeCounts { .. } => FgDenyReason::IncompleteNodeCounts,
        DenyReason::IncompleteSubBlockTopology { .. } => FgDenyReason::IncompleteSubBlockTopology,
        DenyReason::OutsideManagedEnvironment { .. } => FgDenyReason::OutsideManagedEnvironment,
        DenyReason::GateClosed => FgDenyReason::GateClosed,
    }
}

/// Adapter: the host's lookup callback as a `SchedulerClient`.
struct CallbackScheduler {
    lookup: FgLookupFn,
    user_data: *mut c_void,
}

// The callback contract requires the host side to be thread-safe; the
// lookup deadline runs callbacks on a helper thread.
unsafe impl Send for CallbackScheduler {}
unsafe impl Sync for CallbackScheduler {}

impl SchedulerClient for CallbackScheduler {
    fn lookup_step(&self, key: JobStepKey) -> Result<JobStepInfo, LookupError> {
        let mut out = FgStepInfo::empty();
        let rc = unsafe { (self.lookup)(self.user_data, key.job_id, key.step_id, &mut out) };
        match rc {
            0 => {}
            1 => return Err(LookupError::NotFound),
            other => {
                return Err(LookupError::Unavailable(format!(
                    "lookup callback returned {other}"
                )))
            }
        }

        // Copy everything out of host memory before returning.
        let block_id = out
            .block_id
            .as_str()
            .ok_or(LookupError::FieldUnavailable("block id"))?
            .to_string();
        let cnodes = out
            .cnodes
            .as_str()
            .ok_or(LookupError::FieldUnavailable("cnode descriptor"))?
            .to_string();

        Ok(JobStepInfo {
            owner_uid: out.owner_uid,
            block_id,
            cnodes,
            block_node_count: out.block_node_count,
            step_node_count: out.step_node_count,
            geometry: (out.has_geometry != 0).then_some(out.geometry),
            start_corner: (out.has_corner != 0).then_some(out.corner),
        })
    }
}

/// Opaque handle exposed over FFI. One per plugin lifetime.
pub struct FabricGate {
    registry: Arc<JobRegistry>,
    gate: VerificationGate,
    tracker: LifecycleTracker,
}

/// Plugin construction. Returns null if no lookup callback was given.
#[no_mangle]
pub extern "C" fn fabric_gate_new(
    cfg: FgCfg,
    lookup: Option<FgLookupFn>,
    user_data: *mut c_void,
) -> *mut FabricGate {
    let Some(lookup) = lookup else {
        return ptr::null_mut();
    };

    let registry = Arc::new(JobRegistry::new());
    let scheduler: Arc<dyn SchedulerClient + Send + Sync> =
        Arc::new(CallbackScheduler { lookup, user_data });
    let gate = VerificationGate::new(scheduler, Arc::clone(&registry), cfg_from_ffi(cfg));
    let tracker = LifecycleTracker::new(Arc::clone(&registry));

    Box::into_raw(Box::new(FabricGate {
        registry,
        gate,
        tracker,
    }))
}

/// Plugin teardown: drains the registry, then releases the handle.
#[no_mangle]
pub unsafe extern "C" fn fabric_gate_free(h: *mut FabricGate) {
    if h.is_null() {
        return;
    }
    let handle = Box::from_raw(h);
    handle.registry.drain_and_close();
    drop(handle);
}

/// Verify one launch. Returns 0 for allow, 1 for deny, -1 for bad
/// arguments (which is also a deny as far as the host is concerned:
/// `out` is left untouched, so nothing was allowed).
#[no_mangle]
pub unsafe extern "C" fn fabric_gate_verify(
    h: *mut FabricGate,
    req: *const FgLaunchRequest,
    out: *mut FgDecision,
) -> i32 {
    if h.is_null() || req.is_null() || out.is_null() {
        return -1;
    }
    let handle = &*h;
    let req = &*req;

    let mut launch = LaunchRequest::new(
        req.pid,
        req.uid,
        req.exe.as_str().unwrap_or_default().to_string(),
    );

    if !req.args_ptr.is_null() && req.args_len > 0 {
        let args = std::slice::from_raw_parts(req.args_ptr, req.args_len);
        for a in args {
            if let Some(a) = a.as_str() {
                launch = launch.with_arg(a.to_string());
            }
        }
    }

    if !req.envs_ptr.is_null() && req.envs_len > 0 {
        let envs = std::slice::from_raw_parts(req.envs_ptr, req.envs_len);
        for kv in envs {
            let key = match kv.key.as_str() {
                Some(k) => k,
                None => continue,
            };
            let val = kv.val.as_str().unwrap_or_default();
            launch = launch.with_env(key.to_string(), val.to_string());
        }
    }

    match handle.gate.verify(&launch) {
        VerificationDecision::Allow(adm) => {
            let mut decision = FgDecision {
                allow: 1,
                deny_reason: FgDenyReason::None,
                has_placement: 0,
                corner: [0; TOPOLOGY_DIMS],
                shape: [0; TOPOLOGY_DIMS],
                block_id: FgBytes::from_string(adm.block_id),
                cnodes: FgBytes::from_string(adm.cnodes),
            };
            if let Some(p) = adm.placement {
                decision.has_placement = 1;
                decision.corner = p.corner.0;
                decision.shape = p.shape.0;
            }
            out.write(decision);
            0
        }
        VerificationDecision::Deny(reason) => {
            out.write(FgDecision::deny(deny_to_ffi(&reason)));
            1
        }
    }
}

/// Start notification. Informational only.
#[no_mangle]
pub unsafe extern "C" fn fabric_gate_started(h: *mut FabricGate, pid: u32, launcher_job_id: u64) {
    if h.is_null() {
        return;
    }
    (*h).tracker.on_started(pid, launcher_job_id);
}

/// Termination notification. Returns 0 on success, -1 for bad
/// arguments.
#[no_mangle]
pub unsafe extern "C" fn fabric_gate_terminated(h: *mut FabricGate, ev: *const FgTerminated) -> i32 {
    if h.is_null() || ev.is_null() {
        return -1;
    }
    let handle = &*h;
    let ev = &*ev;

    let mut failed_nodes = Vec::new();
    if !ev.nodes_ptr.is_null() && ev.nodes_len > 0 {
        let nodes = std::slice::from_raw_parts(ev.nodes_ptr, ev.nodes_len);
        for n in nodes {
            failed_nodes.push(FailedNode {
                coords: n.coords,
                location: n.location.as_str().unwrap_or_default().to_string(),
            });
        }
    }

    let message = ev
        .message
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    handle.tracker.on_terminated(&TerminationEvent {
        pid: ev.pid,
        kill_timeout: ev.kill_timeout != 0,
        failed_nodes,
        message,
    });
    0
}

/// Release a buffer returned inside an allow decision.
#[no_mangle]
pub unsafe extern "C" fn fabric_gate_bytes_free(b: FgBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}

/// Release both owned buffers of a decision.
#[no_mangle]
pub unsafe extern "C" fn fabric_gate_decision_free(d: FgDecision) {
    fabric_gate_bytes_free(d.block_id);
    fabric_gate_bytes_free(d.cnodes);
}
