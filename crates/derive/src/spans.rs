//! Model-span derivation: matched llm request/response pairs.

use std::collections::{HashMap, HashSet};
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

pub fn model_spans_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(col::DT, DataType::Utf8, false),
        Field::new(col::APP_ID, DataType::Utf8, false),
        Field::new(col::SESSION_ID, DataType::Utf8, false),
        Field::new(col::TURN_INDEX, DataType::Int64, true),
        Field::new("span_id", DataType::Utf8, false),
        Field::new(col::AGENT_ID, DataType::Utf8, true),
        Field::new(col::MODEL, DataType::Utf8, true),
        Field::new(col::PROVIDER, DataType::Utf8, true),
        Field::new("start_ts", ts_type(), false),
        Field::new("end_ts", ts_type(), false),
        Field::new(col::TTFT_MS, DataType::Int64, true),
        Field::new(col::LATENCY_MS, DataType::Int64, true),
        Field::new(col::INPUT_TOKENS, DataType::Int64, true),
        Field::new(col::OUTPUT_TOKENS, DataType::Int64, true),
        Field::new(col::CACHE_TOKENS, DataType::Int64, true),
        Field::new("otps", DataType::Float64, true),
    ]))
}

/// Inner-join `llm_request` rows to `llm_response` rows on `request_id`.
///
/// One span per matched id, in request order; unmatched requests and
/// responses are silently excluded. `otps` (output tokens per second) uses a
/// 1 ms latency floor and is null when either operand is null.
pub fn build_model_spans(batch: &RecordBatch) -> Result<RecordBatch> {
    let kind = str_col(batch, col::EVENT_TYPE)?;
    let request_id = str_col(batch, col::REQUEST_ID)?;
    let ts = ts_col(batch, col::TS)?;
    let turn_index = i64_col(batch, col::TURN_INDEX)?;
    let dt = str_col(batch, col::DT)?;
    let app_id = str_col(batch, col::APP_ID)?;
    let session_id = str_col(batch, col::SESSION_ID)?;
    let agent_id = str_col(batch, col::AGENT_ID)?;
    let model = str_col(batch, col::MODEL)?;
    let provider = str_col(batch, col::PROVIDER)?;
    let ttft_ms = i64_col(batch, col::TTFT_MS)?;
    let latency_ms = i64_col(batch, col::LATENCY_MS)?;
    let input_tokens = i64_col(batch, col::INPUT_TOKENS)?;
    let output_tokens = i64_col(batch, col::OUTPUT_TOKENS)?;
    let cache_tokens = i64_col(batch, col::CACHE_TOKENS)?;

    // First request/response per id; requests keep arrival order.
    let mut requests: Vec<(&str, usize)> = Vec::new();
    let mut seen_requests: HashSet<&str> = HashSet::new();
    let mut responses: HashMap<&str, usize> = HashMap::new();
    for row in 0..batch.num_rows() {
        let Some(id) = opt_str(request_id, row) else {
            continue;
        };
        match kind.value(row) {
            event_type::LLM_REQUEST => {
                if seen_requests.insert(id) {
                    requests.push((id, row));
                }
            }
            event_type::LLM_RESPONSE => {
                responses.entry(id).or_insert(row);
            }
            _ => {}
        }
    }

    let mut b_dt = StringBuilder::new();
    let mut b_app = StringBuilder::new();
    let mut b_session = StringBuilder::new();
    let mut b_turn = Int64Builder::new();
    let mut b_span = StringBuilder::new();
    let mut b_agent = StringBuilder::new();
    let mut b_model = StringBuilder::new();
    let mut b_provider = StringBuilder::new();
    let mut b_start = TimestampMillisecondBuilder::new();
    let mut b_end = TimestampMillisecondBuilder::new();
    let mut b_ttft = Int64Builder::new();
    let mut b_latency = Int64Builder::new();
    let mut b_in = Int64Builder::new();
    let mut b_out = Int64Builder::new();
    let mut b_cache = Int64Builder::new();
    let mut b_otps = Float64Builder::new();

    for (id, req) in requests {
        let Some(&resp) = responses.get(id) else {
            continue;
        };
        b_dt.append_value(dt.value(req));
        b_app.append_value(app_id.value(req));
        b_session.append_value(session_id.value(req));
        b_turn.append_option(opt_i64(turn_index, req));
        b_span.append_value(id);
        b_agent.append_option(opt_str(agent_id, req));
        b_model.append_option(opt_str(model, req));
        b_provider.append_option(opt_str(provider, req));
        b_start.append_value(ts.value(req));
        b_end.append_value(ts.value(resp));
        b_ttft.append_option(opt_i64(ttft_ms, resp));
        let latency = opt_i64(latency_ms, resp);
        b_latency.append_option(latency);
        b_in.append_option(opt_i64(input_tokens, req));
        let out_tokens = opt_i64(output_tokens, resp);
        b_out.append_option(out_tokens);
        b_cache.append_option(opt_i64(cache_tokens, resp));
        b_otps.append_option(match (out_tokens, latency) {
            (Some(tokens), Some(ms)) => Some(tokens as f64 * 1000.0 / ms.max(1) as f64),
            _ => None,
        });
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(b_dt.finish()),
        Arc::new(b_app.finish()),
        Arc::new(b_session.finish()),
        Arc::new(b_turn.finish()),
        Arc::new(b_span.finish()),
        Arc::new(b_agent.finish()),
        Arc::new(b_model.finish()),
        Arc::new(b_provider.finish()),
        Arc::new(b_start.finish()),
        Arc::new(b_end.finish()),
        Arc::new(b_ttft.finish()),
        Arc::new(b_latency.finish()),
        Arc::new(b_in.finish()),
        Arc::new(b_out.finish()),
        Arc::new(b_cache.finish()),
        Arc::new(b_otps.finish()),
    ];
    RecordBatch::try_new(model_spans_schema(), columns)
        .map_err(|e| TrajError::Execution(format!("model-span batch build failed: {e}")))
}
