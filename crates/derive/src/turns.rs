//! Turn aggregation and error normalization.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use traj_catalog::schema::{col, event_type};
use traj_common::{Result, TrajError};

use crate::events::{i64_col, opt_i64, opt_str, str_col, ts_col};

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

pub fn turns_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(col::DT, DataType::Utf8, false),
        Field::new(col::APP_ID, DataType::Utf8, false),
        Field::new(col::SESSION_ID, DataType::Utf8, false),
        Field::new(col::TURN_INDEX, DataType::Int64, false),
        Field::new("start_ts", ts_type(), false),
        Field::new("end_ts", ts_type(), false),
        Field::new("duration_ms", DataType::Int64, false),
        Field::new("model_spans_count", DataType::Int64, false),
        Field::new("tool_calls_count", DataType::Int64, false),
        Field::new("error_count", DataType::Int64, false),
        Field::new("condense_count", DataType::Int64, false),
        Field::new("todo_update_count", DataType::Int64, false),
        Field::new(col::INPUT_TOKENS, DataType::Int64, false),
        Field::new(col::OUTPUT_TOKENS, DataType::Int64, false),
        Field::new(col::CACHE_TOKENS, DataType::Int64, false),
        Field::new("avg_ttft_ms", DataType::Float64, true),
        Field::new("react_iters", DataType::Int64, false),
        Field::new("status", DataType::Utf8, false),
    ]))
}

pub fn errors_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(col::DT, DataType::Utf8, false),
        Field::new(col::APP_ID, DataType::Utf8, false),
        Field::new(col::SESSION_ID, DataType::Utf8, false),
        Field::new(col::TURN_INDEX, DataType::Int64, true),
        Field::new(col::TS, ts_type(), false),
        Field::new(col::ERROR_TYPE, DataType::Utf8, false),
        Field::new(col::ERROR_CODE, DataType::Utf8, true),
    ]))
}

#[derive(Default)]
struct TurnAcc {
    start_ts: i64,
    end_ts: i64,
    llm_requests: i64,
    tool_calls: i64,
    errors: i64,
    failed_tools: i64,
    condenses: i64,
    todo_updates: i64,
    input_tokens: i64,
    output_tokens: i64,
    cache_tokens: i64,
    ttft_sum: f64,
    ttft_count: i64,
}

/// Aggregate indexed events into one row per
/// `(dt, app_id, session_id, turn_index)` group, first-seen order.
///
/// Indexless rows (null `turn_index`) are excluded. Token sums treat nulls
/// as 0; the ttft mean ignores nulls instead. `react_iters` mirrors the
/// model-request count.
pub fn build_turns(batch: &RecordBatch) -> Result<RecordBatch> {
    let dt = str_col(batch, col::DT)?;
    let app_id = str_col(batch, col::APP_ID)?;
    let session_id = str_col(batch, col::SESSION_ID)?;
    let turn_index = i64_col(batch, col::TURN_INDEX)?;
    let ts = ts_col(batch, col::TS)?;
    let kind = str_col(batch, col::EVENT_TYPE)?;
    let input_tokens = i64_col(batch, col::INPUT_TOKENS)?;
    let output_tokens = i64_col(batch, col::OUTPUT_TOKENS)?;
    let cache_tokens = i64_col(batch, col::CACHE_TOKENS)?;
    let ttft_ms = i64_col(batch, col::TTFT_MS)?;
    let exit_code = i64_col(batch, col::EXIT_CODE)?;

    let mut order: Vec<(String, String, String, i64)> = Vec::new();
    let mut groups: HashMap<(String, String, String, i64), TurnAcc> = HashMap::new();
    for row in 0..batch.num_rows() {
        let Some(idx) = opt_i64(turn_index, row) else {
            continue;
        };
        let key = (
            dt.value(row).to_string(),
            app_id.value(row).to_string(),
            session_id.value(row).to_string(),
            idx,
        );
        let acc = match groups.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                order.push(e.key().clone());
                e.insert(TurnAcc {
                    start_ts: i64::MAX,
                    end_ts: i64::MIN,
                    ..TurnAcc::default()
                })
            }
        };
        let t = ts.value(row);
        acc.start_ts = acc.start_ts.min(t);
        acc.end_ts = acc.end_ts.max(t);
        match kind.value(row) {
            event_type::LLM_REQUEST => acc.llm_requests += 1,
            event_type::TOOL_CALL => acc.tool_calls += 1,
            event_type::ERROR => acc.errors += 1,
            event_type::TOOL_RESULT => {
                if opt_i64(exit_code, row).unwrap_or(0) != 0 {
                    acc.failed_tools += 1;
                }
            }
            event_type::CONDENSE => acc.condenses += 1,
            event_type::TODO_UPDATE => acc.todo_updates += 1,
            _ => {}
        }
        acc.input_tokens += opt_i64(input_tokens, row).unwrap_or(0);
        acc.output_tokens += opt_i64(output_tokens, row).unwrap_or(0);
        acc.cache_tokens += opt_i64(cache_tokens, row).unwrap_or(0);
        if let Some(v) = opt_i64(ttft_ms, row) {
            acc.ttft_sum += v as f64;
            acc.ttft_count += 1;
        }
    }

    let mut b_dt = StringBuilder::new();
    let mut b_app = StringBuilder::new();
    let mut b_session = StringBuilder::new();
    let mut b_turn = Int64Builder::new();
    let mut b_start = TimestampMillisecondBuilder::new();
    let mut b_end = TimestampMillisecondBuilder::new();
    let mut b_duration = Int64Builder::new();
    let mut b_spans = Int64Builder::new();
    let mut b_tools = Int64Builder::new();
    let mut b_errors = Int64Builder::new();
    let mut b_condense = Int64Builder::new();
    let mut b_todo = Int64Builder::new();
    let mut b_in = Int64Builder::new();
    let mut b_out = Int64Builder::new();
    let mut b_cache = Int64Builder::new();
    let mut b_ttft = Float64Builder::new();
    let mut b_react = Int64Builder::new();
    let mut b_status = StringBuilder::new();

    for key in &order {
        let acc = &groups[key];
        b_dt.append_value(&key.0);
        b_app.append_value(&key.1);
        b_session.append_value(&key.2);
        b_turn.append_value(key.3);
        b_start.append_value(acc.start_ts);
        b_end.append_value(acc.end_ts);
        b_duration.append_value(acc.end_ts - acc.start_ts);
        b_spans.append_value(acc.llm_requests);
        b_tools.append_value(acc.tool_calls);
        b_errors.append_value(acc.errors);
        b_condense.append_value(acc.condenses);
        b_todo.append_value(acc.todo_updates);
        b_in.append_value(acc.input_tokens);
        b_out.append_value(acc.output_tokens);
        b_cache.append_value(acc.cache_tokens);
        b_ttft.append_option(
            (acc.ttft_count > 0).then(|| acc.ttft_sum / acc.ttft_count as f64),
        );
        b_react.append_value(acc.llm_requests);
        // A turn fails on any error event or any non-zero tool exit.
        b_status.append_value(if acc.errors > 0 || acc.failed_tools > 0 {
            "fail"
        } else {
            "success"
        });
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(b_dt.finish()),
        Arc::new(b_app.finish()),
        Arc::new(b_session.finish()),
        Arc::new(b_turn.finish()),
        Arc::new(b_start.finish()),
        Arc::new(b_end.finish()),
        Arc::new(b_duration.finish()),
        Arc::new(b_spans.finish()),
        Arc::new(b_tools.finish()),
        Arc::new(b_errors.finish()),
        Arc::new(b_condense.finish()),
        Arc::new(b_todo.finish()),
        Arc::new(b_in.finish()),
        Arc::new(b_out.finish()),
        Arc::new(b_cache.finish()),
        Arc::new(b_ttft.finish()),
        Arc::new(b_react.finish()),
        Arc::new(b_status.finish()),
    ];
    RecordBatch::try_new(turns_schema(), columns)
        .map_err(|e| TrajError::Execution(format!("turn batch build failed: {e}")))
}

/// Extract `error`-typed events as normalized rows.
///
/// A missing `error_type` becomes `unknown` so the rows stay partitionable
/// by error type.
pub fn build_errors(batch: &RecordBatch) -> Result<RecordBatch> {
    let dt = str_col(batch, col::DT)?;
    let app_id = str_col(batch, col::APP_ID)?;
    let session_id = str_col(batch, col::SESSION_ID)?;
    let turn_index = i64_col(batch, col::TURN_INDEX)?;
    let ts = ts_col(batch, col::TS)?;
    let kind = str_col(batch, col::EVENT_TYPE)?;
    let error_type = str_col(batch, col::ERROR_TYPE)?;
    let error_code = str_col(batch, col::ERROR_CODE)?;

    let mut b_dt = StringBuilder::new();
    let mut b_app = StringBuilder::new();
    let mut b_session = StringBuilder::new();
    let mut b_turn = Int64Builder::new();
    let mut b_ts = TimestampMillisecondBuilder::new();
    let mut b_type = StringBuilder::new();
    let mut b_code = StringBuilder::new();

    for row in 0..batch.num_rows() {
        if kind.value(row) != event_type::ERROR {
            continue;
        }
        b_dt.append_value(dt.value(row));
        b_app.append_value(app_id.value(row));
        b_session.append_value(session_id.value(row));
        b_turn.append_option(opt_i64(turn_index, row));
        b_ts.append_value(ts.value(row));
        b_type.append_value(opt_str(error_type, row).unwrap_or("unknown"));
        b_code.append_option(opt_str(error_code, row));
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(b_dt.finish()),
        Arc::new(b_app.finish()),
        Arc::new(b_session.finish()),
        Arc::new(b_turn.finish()),
        Arc::new(b_ts.finish()),
        Arc::new(b_type.finish()),
        Arc::new(b_code.finish()),
    ];
    RecordBatch::try_new(errors_schema(), columns)
        .map_err(|e| TrajError::Execution(format!("error batch build failed: {e}")))
}
