//! Shared configuration, error types, and observability primitives for trajlake crates.
//!
//! Architecture role:
//! - defines engine/runtime configuration passed across layers
//! - provides common [`TrajError`] / [`Result`] contracts
//! - hosts the metrics registry used by the runner and execution context
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{EngineConfig, DEFAULT_DISTRIBUTED_SCAN_THRESHOLD_BYTES};
pub use error::{Result, TrajError};
pub use metrics::{global_metrics, MetricsRegistry};
