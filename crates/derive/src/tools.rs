//! Tool-call derivation: matched tool call/result pairs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Builder, StringBuilder, TimestampMillisecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use traj_catalog::schema::{col, event_type};
use traj_common::{Result, TrajError};

use crate::events::{i64_col, opt_i64, opt_str, str_col, ts_col};

pub fn tool_calls_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(col::DT, DataType::Utf8, false),
        Field::new(col::APP_ID, DataType::Utf8, false),
        Field::new(col::SESSION_ID, DataType::Utf8, false),
        Field::new(col::TURN_INDEX, DataType::Int64, true),
        Field::new("call_id", DataType::Utf8, false),
        Field::new(col::TOOL_NAME, DataType::Utf8, true),
        Field::new("start_ts", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new("end_ts", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        Field::new(col::TOOL_LATENCY_MS, DataType::Int64, true),
        Field::new(col::EXIT_CODE, DataType::Int64, true),
        Field::new("status", DataType::Utf8, false),
    ]))
}

/// Inner-join `tool_call` rows to `tool_result` rows on `request_id`.
///
/// Status is `ok` when the result's exit code (missing treated as 0) is 0,
/// `error` otherwise. Unmatched calls and results are silently excluded.
pub fn build_tool_calls(batch: &RecordBatch) -> Result<RecordBatch> {
    let kind = str_col(batch, col::EVENT_TYPE)?;
    let request_id = str_col(batch, col::REQUEST_ID)?;
    let ts = ts_col(batch, col::TS)?;
    let turn_index = i64_col(batch, col::TURN_INDEX)?;
    let dt = str_col(batch, col::DT)?;
    let app_id = str_col(batch, col::APP_ID)?;
    let session_id = str_col(batch, col::SESSION_ID)?;
    let tool_name = str_col(batch, col::TOOL_NAME)?;
    let tool_latency_ms = i64_col(batch, col::TOOL_LATENCY_MS)?;
    let exit_code = i64_col(batch, col::EXIT_CODE)?;

    let mut calls: Vec<(&str, usize)> = Vec::new();
    let mut seen_calls: HashSet<&str> = HashSet::new();
    let mut results: HashMap<&str, usize> = HashMap::new();
    for row in 0..batch.num_rows() {
        let Some(id) = opt_str(request_id, row) else {
            continue;
        };
        match kind.value(row) {
            event_type::TOOL_CALL => {
                if seen_calls.insert(id) {
                    calls.push((id, row));
                }
            }
            event_type::TOOL_RESULT => {
                results.entry(id).or_insert(row);
            }
            _ => {}
        }
    }

    let mut b_dt = StringBuilder::new();
    let mut b_app = StringBuilder::new();
    let mut b_session = StringBuilder::new();
    let mut b_turn = Int64Builder::new();
    let mut b_call = StringBuilder::new();
    let mut b_tool = StringBuilder::new();
    let mut b_start = TimestampMillisecondBuilder::new();
    let mut b_end = TimestampMillisecondBuilder::new();
    let mut b_latency = Int64Builder::new();
    let mut b_exit = Int64Builder::new();
    let mut b_status = StringBuilder::new();

    for (id, call) in calls {
        let Some(&result) = results.get(id) else {
            continue;
        };
        b_dt.append_value(dt.value(call));
        b_app.append_value(app_id.value(call));
        b_session.append_value(session_id.value(call));
        b_turn.append_option(opt_i64(turn_index, call));
        b_call.append_value(id);
        b_tool.append_option(opt_str(tool_name, call));
        b_start.append_value(ts.value(call));
        b_end.append_value(ts.value(result));
        b_latency.append_option(opt_i64(tool_latency_ms, result));
        let code = opt_i64(exit_code, result);
        b_exit.append_option(code);
        b_status.append_value(if code.unwrap_or(0) == 0 { "ok" } else { "error" });
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(b_dt.finish()),
        Arc::new(b_app.finish()),
        Arc::new(b_session.finish()),
        Arc::new(b_turn.finish()),
        Arc::new(b_call.finish()),
        Arc::new(b_tool.finish()),
        Arc::new(b_start.finish()),
        Arc::new(b_end.finish()),
        Arc::new(b_latency.finish()),
        Arc::new(b_exit.finish()),
        Arc::new(b_status.finish()),
    ];
    RecordBatch::try_new(tool_calls_schema(), columns)
        .map_err(|e| TrajError::Execution(format!("tool-call batch build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use arrow::array::StringArray;
    use traj_catalog::fixtures::{events_batch, EventRow};
    use traj_catalog::schema::event_type;

    use super::build_tool_calls;

    fn statuses(batch: &arrow::record_batch::RecordBatch) -> Vec<String> {
        batch
            .column_by_name("status")
            .expect("status")
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8")
            .iter()
            .map(|v| v.expect("non-null").to_string())
            .collect()
    }

    #[test]
    fn status_follows_exit_code_with_missing_treated_as_ok() {
        let mut no_exit =
            EventRow::new("2026-02-08", "app1", "s1", 6, 6_000, event_type::TOOL_RESULT);
        no_exit.request_id = Some("t3".to_string());
        let batch = events_batch(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, event_type::TOOL_CALL)
                .tool_call("t1", "bash"),
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, event_type::TOOL_RESULT)
                .tool_result("t1", 500, 0),
            EventRow::new("2026-02-08", "app1", "s1", 3, 3_000, event_type::TOOL_CALL)
                .tool_call("t2", "edit"),
            EventRow::new("2026-02-08", "app1", "s1", 4, 4_000, event_type::TOOL_RESULT)
                .tool_result("t2", 100, 1),
            EventRow::new("2026-02-08", "app1", "s1", 5, 5_000, event_type::TOOL_CALL)
                .tool_call("t3", "read"),
            no_exit,
        ])
        .expect("batch");
        let tools = build_tool_calls(&batch).expect("tools");
        assert_eq!(statuses(&tools), vec!["ok", "error", "ok"]);
    }

    #[test]
    fn unmatched_calls_are_excluded() {
        let batch = events_batch(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, event_type::TOOL_CALL)
                .tool_call("t1", "bash"),
        ])
        .expect("batch");
        let tools = build_tool_calls(&batch).expect("tools");
        assert_eq!(tools.num_rows(), 0);
    }
}
