//! Canonical-event fixture builders shared by tests and benches.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::record_batch::RecordBatch;
use traj_common::{Result, TrajError};

use crate::schema::event_schema;

/// One canonical event row with every column representable.
#[derive(Debug, Clone, Default)]
pub struct EventRow {
    pub dt: String,
    pub app_id: String,
    pub session_id: String,
    pub event_id: i64,
    pub ts_ms: i64,
    pub event_type: String,
    pub source: Option<String>,
    pub turn_index: Option<i64>,
    pub agent_id: Option<String>,
    pub request_id: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub cache_tokens: Option<i64>,
    pub ttft_ms: Option<i64>,
    pub latency_ms: Option<i64>,
    pub tool_name: Option<String>,
    pub tool_latency_ms: Option<i64>,
    pub exit_code: Option<i64>,
    pub error_type: Option<String>,
    pub error_code: Option<String>,
    pub user_id: Option<String>,
    pub agent_impl: Option<String>,
    pub agent_version: Option<String>,
    pub accumulated_cost: Option<f64>,
    pub payload: Option<String>,
}

impl EventRow {
    pub fn new(
        dt: &str,
        app_id: &str,
        session_id: &str,
        event_id: i64,
        ts_ms: i64,
        event_type: &str,
    ) -> Self {
        Self {
            dt: dt.to_string(),
            app_id: app_id.to_string(),
            session_id: session_id.to_string(),
            event_id,
            ts_ms,
            event_type: event_type.to_string(),
            ..Self::default()
        }
    }

    pub fn request(mut self, request_id: &str, model: &str, input_tokens: i64) -> Self {
        self.request_id = Some(request_id.to_string());
        self.model = Some(model.to_string());
        self.input_tokens = Some(input_tokens);
        self
    }

    pub fn response(mut self, request_id: &str, output_tokens: i64, latency_ms: i64) -> Self {
        self.request_id = Some(request_id.to_string());
        self.output_tokens = Some(output_tokens);
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn tool_call(mut self, request_id: &str, tool_name: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self.tool_name = Some(tool_name.to_string());
        self
    }

    pub fn tool_result(mut self, request_id: &str, latency_ms: i64, exit_code: i64) -> Self {
        self.request_id = Some(request_id.to_string());
        self.tool_latency_ms = Some(latency_ms);
        self.exit_code = Some(exit_code);
        self
    }

    pub fn error(mut self, error_type: &str, error_code: &str) -> Self {
        self.error_type = Some(error_type.to_string());
        self.error_code = Some(error_code.to_string());
        self
    }

    pub fn meta(mut self, user_id: &str, agent_impl: &str, agent_version: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self.agent_impl = Some(agent_impl.to_string());
        self.agent_version = Some(agent_version.to_string());
        self
    }
}

/// Assemble rows into a canonical-schema RecordBatch.
pub fn events_batch(rows: &[EventRow]) -> Result<RecordBatch> {
    let mut dt = StringBuilder::new();
    let mut app_id = StringBuilder::new();
    let mut session_id = StringBuilder::new();
    let mut event_id = Int64Builder::new();
    let mut ts = TimestampMillisecondBuilder::new();
    let mut event_type = StringBuilder::new();
    let mut source = StringBuilder::new();
    let mut turn_index = Int64Builder::new();
    let mut agent_id = StringBuilder::new();
    let mut request_id = StringBuilder::new();
    let mut model = StringBuilder::new();
    let mut provider = StringBuilder::new();
    let mut input_tokens = Int64Builder::new();
    let mut output_tokens = Int64Builder::new();
    let mut cache_tokens = Int64Builder::new();
    let mut ttft_ms = Int64Builder::new();
    let mut latency_ms = Int64Builder::new();
    let mut tool_name = StringBuilder::new();
    let mut tool_latency_ms = Int64Builder::new();
    let mut exit_code = Int64Builder::new();
    let mut error_type = StringBuilder::new();
    let mut error_code = StringBuilder::new();
    let mut user_id = StringBuilder::new();
    let mut agent_impl = StringBuilder::new();
    let mut agent_version = StringBuilder::new();
    let mut accumulated_cost = Float64Builder::new();
    let mut payload = StringBuilder::new();

    for row in rows {
        dt.append_value(&row.dt);
        app_id.append_value(&row.app_id);
        session_id.append_value(&row.session_id);
        event_id.append_value(row.event_id);
        ts.append_value(row.ts_ms);
        event_type.append_value(&row.event_type);
        source.append_option(row.source.as_deref());
        turn_index.append_option(row.turn_index);
        agent_id.append_option(row.agent_id.as_deref());
        request_id.append_option(row.request_id.as_deref());
        model.append_option(row.model.as_deref());
        provider.append_option(row.provider.as_deref());
        input_tokens.append_option(row.input_tokens);
        output_tokens.append_option(row.output_tokens);
        cache_tokens.append_option(row.cache_tokens);
        ttft_ms.append_option(row.ttft_ms);
        latency_ms.append_option(row.latency_ms);
        tool_name.append_option(row.tool_name.as_deref());
        tool_latency_ms.append_option(row.tool_latency_ms);
        exit_code.append_option(row.exit_code);
        error_type.append_option(row.error_type.as_deref());
        error_code.append_option(row.error_code.as_deref());
        user_id.append_option(row.user_id.as_deref());
        agent_impl.append_option(row.agent_impl.as_deref());
        agent_version.append_option(row.agent_version.as_deref());
        accumulated_cost.append_option(row.accumulated_cost);
        payload.append_option(row.payload.as_deref());
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(dt.finish()),
        Arc::new(app_id.finish()),
        Arc::new(session_id.finish()),
        Arc::new(event_id.finish()),
        Arc::new(ts.finish()),
        Arc::new(event_type.finish()),
        Arc::new(source.finish()),
        Arc::new(turn_index.finish()),
        Arc::new(agent_id.finish()),
        Arc::new(request_id.finish()),
        Arc::new(model.finish()),
        Arc::new(provider.finish()),
        Arc::new(input_tokens.finish()),
        Arc::new(output_tokens.finish()),
        Arc::new(cache_tokens.finish()),
        Arc::new(ttft_ms.finish()),
        Arc::new(latency_ms.finish()),
        Arc::new(tool_name.finish()),
        Arc::new(tool_latency_ms.finish()),
        Arc::new(exit_code.finish()),
        Arc::new(error_type.finish()),
        Arc::new(error_code.finish()),
        Arc::new(user_id.finish()),
        Arc::new(agent_impl.finish()),
        Arc::new(agent_version.finish()),
        Arc::new(accumulated_cost.finish()),
        Arc::new(payload.finish()),
    ];

    RecordBatch::try_new(event_schema(), columns)
        .map_err(|e| TrajError::Execution(format!("fixture batch build failed: {e}")))
}
