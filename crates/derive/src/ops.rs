//! Operators wrapping the derivation algorithms.
//!
//! All of these are stateful across the rows of a session (turn-index
//! counters, request/response joins), so they pin the batch size to the
//! whole shard: a block handed to them is never split, and the pipeline
//! feeds them session-contiguous blocks.

use std::collections::HashMap;

use arrow::record_batch::RecordBatch;
use traj_common::Result;
use traj_exec::{ExecContext, Operator, OperatorOutput, WorkerBatch};

use crate::sessions::build_sessions;
use crate::spans::build_model_spans;
use crate::tools::build_tool_calls;
use crate::turn_index::assign_turn_index;
use crate::turns::{build_errors, build_turns};

/// Derives `turns` and `errors` from one shard of canonical events.
pub struct DeriveTurnsOp;

impl Operator for DeriveTurnsOp {
    fn name(&self) -> &'static str {
        "derive_turns"
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["turns", "errors"]
    }

    fn batch_size(&self) -> Option<usize> {
        Some(usize::MAX)
    }

    fn transform(&self, _ctx: &ExecContext, batch: &mut WorkerBatch<'_>) -> Result<OperatorOutput> {
        let indexed = assign_turn_index(batch.arrow())?;
        Ok(OperatorOutput::Named(HashMap::from([
            ("turns".to_string(), build_turns(&indexed)?),
            ("errors".to_string(), build_errors(&indexed)?),
        ])))
    }
}

/// Derives `model_spans` from one shard of canonical events.
pub struct DeriveModelSpansOp;

impl Operator for DeriveModelSpansOp {
    fn name(&self) -> &'static str {
        "derive_model_spans"
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["model_spans"]
    }

    fn batch_size(&self) -> Option<usize> {
        Some(usize::MAX)
    }

    fn transform(&self, _ctx: &ExecContext, batch: &mut WorkerBatch<'_>) -> Result<OperatorOutput> {
        let indexed = assign_turn_index(batch.arrow())?;
        Ok(OperatorOutput::Single(build_model_spans(&indexed)?))
    }
}

/// Derives `tool_calls` from one shard of canonical events.
pub struct DeriveToolCallsOp;

impl Operator for DeriveToolCallsOp {
    fn name(&self) -> &'static str {
        "derive_tool_calls"
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["tool_calls"]
    }

    fn batch_size(&self) -> Option<usize> {
        Some(usize::MAX)
    }

    fn transform(&self, _ctx: &ExecContext, batch: &mut WorkerBatch<'_>) -> Result<OperatorOutput> {
        let indexed = assign_turn_index(batch.arrow())?;
        Ok(OperatorOutput::Single(build_tool_calls(&indexed)?))
    }
}

/// Derives `sessions` from a shard of turns.
///
/// Carries the indexed raw events of the same shard for first-error and
/// metadata lookup, which indexless events never reach the turns table for.
pub struct DeriveSessionsOp {
    raw_events: RecordBatch,
}

impl DeriveSessionsOp {
    pub fn new(raw_events: RecordBatch) -> Self {
        Self { raw_events }
    }
}

impl Operator for DeriveSessionsOp {
    fn name(&self) -> &'static str {
        "derive_sessions"
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["sessions"]
    }

    fn batch_size(&self) -> Option<usize> {
        Some(usize::MAX)
    }

    fn transform(&self, _ctx: &ExecContext, batch: &mut WorkerBatch<'_>) -> Result<OperatorOutput> {
        Ok(OperatorOutput::Single(build_sessions(
            batch.arrow(),
            &self.raw_events,
        )?))
    }
}
