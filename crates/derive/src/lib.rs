//! Derivation of analytical tables from the canonical event stream.
//!
//! Architecture role:
//! - [`turn_index`]: the stateful per-session counter every later stage
//!   depends on
//! - [`spans`] / [`tools`]: request/response and call/result join tables
//! - [`turns`] / [`sessions`]: aggregation levels, plus normalized errors
//! - [`ops`] / [`pipeline`]: operator wrappers and the end-to-end run

pub mod ops;
pub mod pipeline;
pub mod sessions;
pub mod spans;
pub mod tools;
pub mod turn_index;
pub mod turns;

mod events;

pub use ops::{DeriveModelSpansOp, DeriveSessionsOp, DeriveToolCallsOp, DeriveTurnsOp};
pub use pipeline::{DerivePipeline, DeriveReport};
pub use sessions::build_sessions;
pub use spans::build_model_spans;
pub use tools::build_tool_calls;
pub use turn_index::assign_turn_index;
pub use turns::{build_errors, build_turns};
