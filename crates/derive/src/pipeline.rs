//! End-to-end derivation: raw events in, derived tables out.

use std::collections::{BTreeMap, HashMap};

use arrow::record_batch::RecordBatch;
use tracing::info;
use traj_catalog::{ReadFilters, WriteMode, WriteReport};
use traj_common::{Result, TrajError};
use traj_exec::{Dataset, ExecContext};

use crate::ops::{DeriveModelSpansOp, DeriveSessionsOp, DeriveToolCallsOp, DeriveTurnsOp};
use crate::turn_index::assign_turn_index;
use crate::turns::turns_schema;

/// Per-table write outcomes of one pipeline run.
#[derive(Debug, Default)]
pub struct DeriveReport {
    pub tables: BTreeMap<String, WriteReport>,
}

/// Reads `raw_events`, applies the derivation operators, and overwrites the
/// derived tables.
///
/// The turn-index counter is only correct when a session's events share a
/// shard, so the pipeline concatenates the scan into a single
/// session-sorted shard before the stateful stages.
pub struct DerivePipeline {
    ctx: ExecContext,
}

impl DerivePipeline {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn run(&self, filters: Option<&ReadFilters>) -> Result<DeriveReport> {
        let raw = self.ctx.read("raw_events", filters)?;
        let merged = match raw.concat()? {
            Some(batch) => batch,
            None => {
                info!("no raw events matched; nothing to derive");
                return Ok(DeriveReport::default());
            }
        };
        info!(rows = merged.num_rows(), "deriving from raw events");
        let events = Dataset::new(vec![merged.clone()]);

        let mut turns_errors = self.ctx.apply(&DeriveTurnsOp, &events)?;
        let turns = take_output(&mut turns_errors, "turns")?;
        let errors = take_output(&mut turns_errors, "errors")?;
        let spans = take_output(
            &mut self.ctx.apply(&DeriveModelSpansOp, &events)?,
            "model_spans",
        )?;
        let tools = take_output(
            &mut self.ctx.apply(&DeriveToolCallsOp, &events)?,
            "tool_calls",
        )?;

        let indexed = assign_turn_index(&merged)?;
        let turns_block = turns
            .concat()?
            .unwrap_or_else(|| RecordBatch::new_empty(turns_schema()));
        let sessions = take_output(
            &mut self.ctx.apply(
                &DeriveSessionsOp::new(indexed),
                &Dataset::new(vec![turns_block]),
            )?,
            "sessions",
        )?;

        let mut report = DeriveReport::default();
        for (table, ds) in [
            ("model_spans", &spans),
            ("tool_calls", &tools),
            ("turns", &turns),
            ("errors", &errors),
            ("sessions", &sessions),
        ] {
            let wr = self.ctx.write(ds, table, None, None, WriteMode::Overwrite)?;
            info!(table, rows = wr.rows, files = wr.files, "derived table written");
            report.tables.insert(table.to_string(), wr);
        }
        Ok(report)
    }
}

fn take_output(outputs: &mut HashMap<String, Dataset>, name: &str) -> Result<Dataset> {
    outputs
        .remove(name)
        .ok_or_else(|| TrajError::Execution(format!("operator produced no '{name}' output")))
}
