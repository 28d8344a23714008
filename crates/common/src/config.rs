use serde::{Deserialize, Serialize};

/// Default cutoff (20 GiB) above which work is routed to the distributed engine.
pub const DEFAULT_DISTRIBUTED_SCAN_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024 * 1024;

/// Engine/runtime knobs shared by the execution context and both engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target batch size for operators that do not override it.
    pub batch_size_rows: usize,
    /// Max concurrent worker threads for distributed batch mapping.
    pub worker_slots: usize,
    /// Scratch directory for per-worker staging files.
    pub staging_dir: String,
    /// Estimated-scan-bytes cutoff for distributed engine selection.
    pub distributed_scan_threshold_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size_rows: 8192,
            worker_slots: 4,
            staging_dir: ".traj_staging".to_string(),
            distributed_scan_threshold_bytes: DEFAULT_DISTRIBUTED_SCAN_THRESHOLD_BYTES,
        }
    }
}
