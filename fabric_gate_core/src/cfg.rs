use std::time::Duration;

/// Gate tuning knobs.
#[derive(Clone, Debug)]
pub struct GateCfg {
    /// Deadline for one manager lookup. `None` means wait forever,
    /// which reproduces the historical behavior of blocking a launch
    /// indefinitely on an unresponsive manager; the default caps it.
    pub lookup_timeout: Option<Duration>,
    /// Minimum plausible block-id length. Anything shorter did not
    /// come from a manager-tracked allocation.
    pub min_block_id_len: usize,
}

impl Default for GateCfg {
    fn default() -> Self {
        Self {
            lookup_timeout: Some(Duration::from_secs(10)),
            min_block_id_len: 3,
        }
    }
}
