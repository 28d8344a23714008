//! Dual-engine analysis execution.
//!
//! Architecture role:
//! - [`local`]: embedded SQL engine over catalog-resolved parquet views
//! - [`distributed`]: parallel dataset engine built on the execution context
//! - [`runner`]: per-run engine selection by scan size and unit requirements
//! - [`analysis`]: the unit-of-analysis contract both engines satisfy

pub mod analysis;
pub mod distributed;
pub mod engine;
pub mod local;
pub mod registry;
pub mod rowset;
pub mod runner;

pub use analysis::{AnalysisParams, AnalysisResult, AnalysisTable, AnalysisUnit};
pub use distributed::DistributedEngine;
pub use engine::{Engine, EngineKind};
pub use local::LocalEngine;
pub use registry::TableRegistry;
pub use rowset::RowSet;
pub use runner::Runner;
