//! Engine-neutral batch execution.
//!
//! A [`Dataset`](dataset::Dataset) is an ordered list of record-batch blocks;
//! [`Operator`](operator::Operator)s transform it one self-contained batch at
//! a time through [`ExecContext::apply`](context::ExecContext::apply), with
//! multi-output operators fanned out over a tagged stream. Workers escalate
//! to SQL through the per-worker [`WorkerRuntime`](runtime::WorkerRuntime).

pub mod context;
pub mod dataset;
pub mod operator;
pub mod runtime;

pub use context::{ExecContext, OUTPUT_COLUMN};
pub use dataset::{Dataset, MapBatchesOptions};
pub use operator::{normalize_output, Operator, OperatorOutput};
pub use runtime::{WorkerBatch, WorkerRuntime};
