use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fabric_gate_core::{
    DenyReason, GateCfg, JobStepInfo, JobStepKey, LaunchRequest, LookupError, SchedulerClient,
    VerificationDecision, ENV_JOB_ID, ENV_STEP_ID,
};
use fabric_gate_supervisor::{
    FailedNode, JobRegistry, LifecycleTracker, TerminationEvent, VerificationGate,
};

struct MapScheduler {
    steps: HashMap<JobStepKey, JobStepInfo>,
}

impl MapScheduler {
    fn new() -> Self {
        Self { steps: HashMap::new() }
    }

    fn with_step(mut self, key: JobStepKey, info: JobStepInfo) -> Self {
        self.steps.insert(key, info);
        self
    }
}

impl SchedulerClient for MapScheduler {
    fn lookup_step(&self, key: JobStepKey) -> Result<JobStepInfo, LookupError> {
        self.steps.get(&key).cloned().ok_or(LookupError::NotFound)
    }
}

struct StalledScheduler {
    delay: Duration,
}

impl SchedulerClient for StalledScheduler {
    fn lookup_step(&self, _key: JobStepKey) -> Result<JobStepInfo, LookupError> {
        thread::sleep(self.delay);
        Err(LookupError::Unavailable("manager came back too late".into()))
    }
}

fn whole_block_info(owner_uid: u32) -> JobStepInfo {
    JobStepInfo {
        owner_uid,
        block_id: "RMP16Apr1234".to_string(),
        cnodes: "bgq0000[0-3]".to_string(),
        block_node_count: 512,
        step_node_count: 512,
        geometry: None,
        start_corner: None,
    }
}

fn request(pid: u32, uid: u32, key: JobStepKey) -> LaunchRequest<'static> {
    LaunchRequest::new(pid, uid, "/bin/app")
        .with_arg("--ranks-per-node=16")
        .with_env(ENV_JOB_ID, key.job_id.to_string())
        .with_env(ENV_STEP_ID, key.step_id.to_string())
}

fn gate_with(
    scheduler: Arc<dyn SchedulerClient + Send + Sync>,
    registry: Arc<JobRegistry>,
) -> VerificationGate {
    VerificationGate::new(scheduler, registry, GateCfg::default())
}

#[test]
fn allow_then_terminate_round_trip() {
    let key = JobStepKey { job_id: 10, step_id: 0 };
    let scheduler = Arc::new(MapScheduler::new().with_step(key, whole_block_info(500)));
    let registry = Arc::new(JobRegistry::new());
    let gate = gate_with(scheduler, Arc::clone(&registry));
    let tracker = LifecycleTracker::new(Arc::clone(&registry));

    let decision = gate.verify(&request(4242, 500, key));
    assert!(decision.is_allow(), "got {decision:?}");
    assert_eq!(registry.len(), 1);

    tracker.on_started(4242, 77);

    tracker.on_terminated(&TerminationEvent { pid: 4242, ..Default::default() });
    assert_eq!(registry.len(), 0);

    // Duplicate notification: a not-found, not a crash.
    tracker.on_terminated(&TerminationEvent { pid: 4242, ..Default::default() });
    assert_eq!(registry.len(), 0);
}

#[test]
fn kill_timeout_termination_still_removes_the_entry() {
    let key = JobStepKey { job_id: 10, step_id: 0 };
    let scheduler = Arc::new(MapScheduler::new().with_step(key, whole_block_info(500)));
    let registry = Arc::new(JobRegistry::new());
    let gate = gate_with(scheduler, Arc::clone(&registry));
    let tracker = LifecycleTracker::new(Arc::clone(&registry));

    assert!(gate.verify(&request(4242, 500, key)).is_allow());

    tracker.on_terminated(&TerminationEvent {
        pid: 4242,
        kill_timeout: true,
        // Failed nodes and message are present but outranked by the
        // kill timeout; the entry must still come out of the registry.
        failed_nodes: vec![FailedNode {
            coords: [0, 0, 0, 0, 0],
            location: "R00-M0-N00-J00".to_string(),
        }],
        message: Some("ignored".to_string()),
    });
    assert_eq!(registry.len(), 0);
}

#[test]
fn failed_node_termination_reports_and_removes() {
    let key = JobStepKey { job_id: 10, step_id: 0 };
    let scheduler = Arc::new(MapScheduler::new().with_step(key, whole_block_info(500)));
    let registry = Arc::new(JobRegistry::new());
    let gate = gate_with(scheduler, Arc::clone(&registry));
    let tracker = LifecycleTracker::new(Arc::clone(&registry));

    assert!(gate.verify(&request(4242, 500, key)).is_allow());

    let nodes = vec![
        FailedNode { coords: [1, 2, 3, 4, 5], location: "R00-M0-N04-J07".to_string() },
        FailedNode { coords: [0, 0, 0, 1, 0], location: "R00-M0-N00-J12".to_string() },
    ];
    assert_eq!(nodes[0].compact_location(), "12345");
    assert_eq!(nodes[1].compact_location(), "00010");

    tracker.on_terminated(&TerminationEvent {
        pid: 4242,
        kill_timeout: false,
        failed_nodes: nodes,
        message: None,
    });
    assert_eq!(registry.len(), 0);
}

#[test]
fn unknown_step_denies_without_registering() {
    let scheduler = Arc::new(MapScheduler::new());
    let registry = Arc::new(JobRegistry::new());
    let gate = gate_with(scheduler, Arc::clone(&registry));

    let key = JobStepKey { job_id: 99, step_id: 3 };
    let decision = gate.verify(&request(1, 500, key));
    assert_eq!(
        decision.deny_reason(),
        Some(&DenyReason::StepNotFound { key })
    );
    assert_eq!(registry.len(), 0);
}

#[test]
fn missing_keys_deny_before_any_lookup() {
    let scheduler = Arc::new(MapScheduler::new());
    let registry = Arc::new(JobRegistry::new());
    let gate = gate_with(scheduler, Arc::clone(&registry));

    let req = LaunchRequest::new(1, 500, "/bin/app").with_env(ENV_JOB_ID, "10");
    assert_eq!(
        gate.verify(&req).deny_reason(),
        Some(&DenyReason::MissingCorrelationKeys)
    );
}

#[test]
fn lookup_timeout_resolves_to_deny() {
    let key = JobStepKey { job_id: 10, step_id: 0 };
    let scheduler = Arc::new(StalledScheduler { delay: Duration::from_secs(2) });
    let registry = Arc::new(JobRegistry::new());
    let cfg = GateCfg {
        lookup_timeout: Some(Duration::from_millis(50)),
        ..GateCfg::default()
    };
    let gate = VerificationGate::new(scheduler, Arc::clone(&registry), cfg);

    let decision = gate.verify(&request(1, 500, key));
    assert!(
        matches!(decision.deny_reason(), Some(DenyReason::MetadataFetchFailed(_))),
        "got {decision:?}"
    );
    assert_eq!(registry.len(), 0);
}

#[test]
fn closed_registry_denies_and_silences_terminations() {
    let key = JobStepKey { job_id: 10, step_id: 0 };
    let scheduler = Arc::new(MapScheduler::new().with_step(key, whole_block_info(500)));
    let registry = Arc::new(JobRegistry::new());
    let gate = gate_with(scheduler, Arc::clone(&registry));
    let tracker = LifecycleTracker::new(Arc::clone(&registry));

    assert!(gate.verify(&request(4242, 500, key)).is_allow());
    let drained = registry.drain_and_close();
    assert_eq!(drained.len(), 1);
    assert!(registry.is_closed());

    // Verification after teardown fails closed.
    assert_eq!(
        gate.verify(&request(4243, 500, key)).deny_reason(),
        Some(&DenyReason::GateClosed)
    );

    // Late termination callbacks land harmlessly.
    tracker.on_terminated(&TerminationEvent { pid: 4242, ..Default::default() });
}

#[test]
fn pid_reuse_replaces_the_stale_entry() {
    let key_a = JobStepKey { job_id: 10, step_id: 0 };
    let key_b = JobStepKey { job_id: 11, step_id: 0 };
    let scheduler = Arc::new(
        MapScheduler::new()
            .with_step(key_a, whole_block_info(500))
            .with_step(key_b, whole_block_info(500)),
    );
    let registry = Arc::new(JobRegistry::new());
    let gate = gate_with(scheduler, Arc::clone(&registry));

    assert!(gate.verify(&request(4242, 500, key_a)).is_allow());
    assert!(gate.verify(&request(4242, 500, key_b)).is_allow());
    assert_eq!(registry.len(), 1);

    let desc = registry.remove_by_pid(4242).unwrap().unwrap();
    assert_eq!(desc.key, key_b);
}

#[test]
fn concurrent_verifies_each_land_exactly_one_entry() {
    const N: u32 = 16;

    let mut scheduler = MapScheduler::new();
    for i in 0..N {
        let key = JobStepKey { job_id: 100 + i, step_id: 0 };
        scheduler = scheduler.with_step(key, whole_block_info(500 + i));
    }
    let scheduler: Arc<dyn SchedulerClient + Send + Sync> = Arc::new(scheduler);
    let registry = Arc::new(JobRegistry::new());
    let gate = Arc::new(gate_with(scheduler, Arc::clone(&registry)));

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let key = JobStepKey { job_id: 100 + i, step_id: 0 };
                gate.verify(&request(9000 + i, 500 + i, key)).is_allow()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("verify thread panicked"));
    }
    assert_eq!(registry.len(), N as usize);

    // No entry is cross-assigned: each pid maps back to its own step.
    for i in 0..N {
        let desc = registry.remove_by_pid(9000 + i).unwrap().unwrap();
        assert_eq!(desc.key, JobStepKey { job_id: 100 + i, step_id: 0 });
    }
}
