//! Canonical flat event schema produced by ingestion adapters.
//!
//! Every adapter must populate every column (null where not applicable) so
//! downstream derivation sees a uniform shape regardless of source format.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};

/// Column names for the canonical event stream.
pub mod col {
    pub const DT: &str = "dt";
    pub const APP_ID: &str = "app_id";
    pub const SESSION_ID: &str = "session_id";
    pub const EVENT_ID: &str = "event_id";
    pub const TS: &str = "ts";
    pub const EVENT_TYPE: &str = "event_type";
    pub const SOURCE: &str = "source";
    pub const TURN_INDEX: &str = "turn_index";
    pub const AGENT_ID: &str = "agent_id";
    pub const REQUEST_ID: &str = "request_id";
    pub const MODEL: &str = "model";
    pub const PROVIDER: &str = "provider";
    pub const INPUT_TOKENS: &str = "input_tokens";
    pub const OUTPUT_TOKENS: &str = "output_tokens";
    pub const CACHE_TOKENS: &str = "cache_tokens";
    pub const TTFT_MS: &str = "ttft_ms";
    pub const LATENCY_MS: &str = "latency_ms";
    pub const TOOL_NAME: &str = "tool_name";
    pub const TOOL_LATENCY_MS: &str = "tool_latency_ms";
    pub const EXIT_CODE: &str = "exit_code";
    pub const ERROR_TYPE: &str = "error_type";
    pub const ERROR_CODE: &str = "error_code";
    pub const USER_ID: &str = "user_id";
    pub const AGENT_IMPL: &str = "agent_impl";
    pub const AGENT_VERSION: &str = "agent_version";
    pub const ACCUMULATED_COST: &str = "accumulated_cost";
    pub const PAYLOAD: &str = "payload";
}

/// Closed event-type vocabulary the derivation stage reacts to.
/// Other values pass through untouched.
pub mod event_type {
    pub const TURN_START: &str = "turn_start";
    pub const LLM_REQUEST: &str = "llm_request";
    pub const LLM_RESPONSE: &str = "llm_response";
    pub const TOOL_CALL: &str = "tool_call";
    pub const TOOL_RESULT: &str = "tool_result";
    pub const ERROR: &str = "error";
    pub const CONDENSE: &str = "condense";
    pub const TODO_UPDATE: &str = "todo_update";
}

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

/// Arrow schema for the canonical event stream.
pub fn event_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(col::DT, DataType::Utf8, false),
        Field::new(col::APP_ID, DataType::Utf8, false),
        Field::new(col::SESSION_ID, DataType::Utf8, false),
        Field::new(col::EVENT_ID, DataType::Int64, false),
        Field::new(col::TS, ts_type(), false),
        Field::new(col::EVENT_TYPE, DataType::Utf8, false),
        Field::new(col::SOURCE, DataType::Utf8, true),
        Field::new(col::TURN_INDEX, DataType::Int64, true),
        Field::new(col::AGENT_ID, DataType::Utf8, true),
        Field::new(col::REQUEST_ID, DataType::Utf8, true),
        Field::new(col::MODEL, DataType::Utf8, true),
        Field::new(col::PROVIDER, DataType::Utf8, true),
        Field::new(col::INPUT_TOKENS, DataType::Int64, true),
        Field::new(col::OUTPUT_TOKENS, DataType::Int64, true),
        Field::new(col::CACHE_TOKENS, DataType::Int64, true),
        Field::new(col::TTFT_MS, DataType::Int64, true),
        Field::new(col::LATENCY_MS, DataType::Int64, true),
        Field::new(col::TOOL_NAME, DataType::Utf8, true),
        Field::new(col::TOOL_LATENCY_MS, DataType::Int64, true),
        Field::new(col::EXIT_CODE, DataType::Int64, true),
        Field::new(col::ERROR_TYPE, DataType::Utf8, true),
        Field::new(col::ERROR_CODE, DataType::Utf8, true),
        Field::new(col::USER_ID, DataType::Utf8, true),
        Field::new(col::AGENT_IMPL, DataType::Utf8, true),
        Field::new(col::AGENT_VERSION, DataType::Utf8, true),
        Field::new(col::ACCUMULATED_COST, DataType::Float64, true),
        Field::new(col::PAYLOAD, DataType::Utf8, true),
    ]))
}
