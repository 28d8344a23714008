//! Session aggregation over derived turns plus raw-event lookups.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Int64Builder, StringBuilder, TimestampMillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use traj_catalog::schema::{col, event_type};
use traj_common::{Result, TrajError};

use crate::events::{i64_col, opt_i64, opt_str, str_col, ts_col};

fn ts_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

pub fn sessions_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(col::DT, DataType::Utf8, false),
        Field::new(col::APP_ID, DataType::Utf8, false),
        Field::new(col::SESSION_ID, DataType::Utf8, false),
        Field::new("turns_count", DataType::Int64, false),
        Field::new("start_ts", ts_type(), false),
        Field::new("end_ts", ts_type(), false),
        Field::new("duration_ms", DataType::Int64, false),
        Field::new("model_spans_count", DataType::Int64, false),
        Field::new("tool_calls_count", DataType::Int64, false),
        Field::new("error_count", DataType::Int64, false),
        Field::new(col::INPUT_TOKENS, DataType::Int64, false),
        Field::new(col::OUTPUT_TOKENS, DataType::Int64, false),
        Field::new(col::CACHE_TOKENS, DataType::Int64, false),
        Field::new("first_error_turn_index", DataType::Int64, true),
        Field::new("first_error_type", DataType::Utf8, true),
        Field::new(col::USER_ID, DataType::Utf8, true),
        Field::new(col::AGENT_IMPL, DataType::Utf8, true),
        Field::new(col::AGENT_VERSION, DataType::Utf8, true),
        Field::new("status", DataType::Utf8, false),
    ]))
}

#[derive(Default)]
struct SessionAcc {
    turns: i64,
    start_ts: i64,
    end_ts: i64,
    model_spans: i64,
    tool_calls: i64,
    errors: i64,
    failed_turns: i64,
    input_tokens: i64,
    output_tokens: i64,
    cache_tokens: i64,
}

struct FirstError {
    // Null turn index means the error preceded any turn_start; it ranks
    // before every indexed turn.
    sort_key: i64,
    turn_index: Option<i64>,
    error_type: Option<String>,
}

struct Metadata {
    ts: i64,
    event_id: i64,
    user_id: Option<String>,
    agent_impl: Option<String>,
    agent_version: Option<String>,
}

/// Aggregate turns into one row per `(dt, app_id, session_id)`.
///
/// Counts and tokens are summed over the session's turns; `duration_ms`
/// spans min start to max end. The first-error pointer and the session
/// metadata come from `raw_events` (post turn-index assignment), since
/// indexless events never reach the turns table.
pub fn build_sessions(turns: &RecordBatch, raw_events: &RecordBatch) -> Result<RecordBatch> {
    let t_dt = str_col(turns, col::DT)?;
    let t_app = str_col(turns, col::APP_ID)?;
    let t_session = str_col(turns, col::SESSION_ID)?;
    let t_start = ts_col(turns, "start_ts")?;
    let t_end = ts_col(turns, "end_ts")?;
    let t_spans = i64_col(turns, "model_spans_count")?;
    let t_tools = i64_col(turns, "tool_calls_count")?;
    let t_errors = i64_col(turns, "error_count")?;
    let t_in = i64_col(turns, col::INPUT_TOKENS)?;
    let t_out = i64_col(turns, col::OUTPUT_TOKENS)?;
    let t_cache = i64_col(turns, col::CACHE_TOKENS)?;
    let t_status = str_col(turns, "status")?;

    let mut order: Vec<(String, String, String)> = Vec::new();
    let mut groups: HashMap<(String, String, String), SessionAcc> = HashMap::new();
    for row in 0..turns.num_rows() {
        let key = (
            t_dt.value(row).to_string(),
            t_app.value(row).to_string(),
            t_session.value(row).to_string(),
        );
        let acc = match groups.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                order.push(e.key().clone());
                e.insert(SessionAcc {
                    start_ts: i64::MAX,
                    end_ts: i64::MIN,
                    ..SessionAcc::default()
                })
            }
        };
        acc.turns += 1;
        acc.start_ts = acc.start_ts.min(t_start.value(row));
        acc.end_ts = acc.end_ts.max(t_end.value(row));
        acc.model_spans += t_spans.value(row);
        acc.tool_calls += t_tools.value(row);
        acc.errors += t_errors.value(row);
        if t_status.value(row) == "fail" {
            acc.failed_turns += 1;
        }
        acc.input_tokens += t_in.value(row);
        acc.output_tokens += t_out.value(row);
        acc.cache_tokens += t_cache.value(row);
    }

    let (first_errors, metadata) = scan_raw_events(raw_events)?;

    let mut b_dt = StringBuilder::new();
    let mut b_app = StringBuilder::new();
    let mut b_session = StringBuilder::new();
    let mut b_turns = Int64Builder::new();
    let mut b_start = TimestampMillisecondBuilder::new();
    let mut b_end = TimestampMillisecondBuilder::new();
    let mut b_duration = Int64Builder::new();
    let mut b_spans = Int64Builder::new();
    let mut b_tools = Int64Builder::new();
    let mut b_errors = Int64Builder::new();
    let mut b_in = Int64Builder::new();
    let mut b_out = Int64Builder::new();
    let mut b_cache = Int64Builder::new();
    let mut b_err_turn = Int64Builder::new();
    let mut b_err_type = StringBuilder::new();
    let mut b_user = StringBuilder::new();
    let mut b_impl = StringBuilder::new();
    let mut b_version = StringBuilder::new();
    let mut b_status = StringBuilder::new();

    for key in &order {
        let acc = &groups[key];
        b_dt.append_value(&key.0);
        b_app.append_value(&key.1);
        b_session.append_value(&key.2);
        b_turns.append_value(acc.turns);
        b_start.append_value(acc.start_ts);
        b_end.append_value(acc.end_ts);
        b_duration.append_value(acc.end_ts - acc.start_ts);
        b_spans.append_value(acc.model_spans);
        b_tools.append_value(acc.tool_calls);
        b_errors.append_value(acc.errors);
        b_in.append_value(acc.input_tokens);
        b_out.append_value(acc.output_tokens);
        b_cache.append_value(acc.cache_tokens);
        match first_errors.get(key) {
            Some(fe) => {
                b_err_turn.append_option(fe.turn_index);
                b_err_type.append_option(fe.error_type.as_deref());
            }
            None => {
                b_err_turn.append_null();
                b_err_type.append_null();
            }
        }
        match metadata.get(key) {
            Some(meta) => {
                b_user.append_option(meta.user_id.as_deref());
                b_impl.append_option(meta.agent_impl.as_deref());
                b_version.append_option(meta.agent_version.as_deref());
            }
            None => {
                b_user.append_null();
                b_impl.append_null();
                b_version.append_null();
            }
        }
        b_status.append_value(if acc.failed_turns > 0 { "fail" } else { "success" });
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(b_dt.finish()),
        Arc::new(b_app.finish()),
        Arc::new(b_session.finish()),
        Arc::new(b_turns.finish()),
        Arc::new(b_start.finish()),
        Arc::new(b_end.finish()),
        Arc::new(b_duration.finish()),
        Arc::new(b_spans.finish()),
        Arc::new(b_tools.finish()),
        Arc::new(b_errors.finish()),
        Arc::new(b_in.finish()),
        Arc::new(b_out.finish()),
        Arc::new(b_cache.finish()),
        Arc::new(b_err_turn.finish()),
        Arc::new(b_err_type.finish()),
        Arc::new(b_user.finish()),
        Arc::new(b_impl.finish()),
        Arc::new(b_version.finish()),
        Arc::new(b_status.finish()),
    ];
    RecordBatch::try_new(sessions_schema(), columns)
        .map_err(|e| TrajError::Execution(format!("session batch build failed: {e}")))
}

type SessionKey = (String, String, String);

/// One pass over raw events collecting, per session, the first error by
/// `(turn_index, event order)` and the metadata of the chronologically first
/// event.
fn scan_raw_events(
    raw: &RecordBatch,
) -> Result<(HashMap<SessionKey, FirstError>, HashMap<SessionKey, Metadata>)> {
    let dt = str_col(raw, col::DT)?;
    let app_id = str_col(raw, col::APP_ID)?;
    let session_id = str_col(raw, col::SESSION_ID)?;
    let event_id = i64_col(raw, col::EVENT_ID)?;
    let ts = ts_col(raw, col::TS)?;
    let kind = str_col(raw, col::EVENT_TYPE)?;
    let turn_index = i64_col(raw, col::TURN_INDEX)?;
    let error_type = str_col(raw, col::ERROR_TYPE)?;
    let user_id = str_col(raw, col::USER_ID)?;
    let agent_impl = str_col(raw, col::AGENT_IMPL)?;
    let agent_version = str_col(raw, col::AGENT_VERSION)?;

    let mut first_errors: HashMap<SessionKey, FirstError> = HashMap::new();
    let mut metadata: HashMap<SessionKey, Metadata> = HashMap::new();
    for row in 0..raw.num_rows() {
        let key = (
            dt.value(row).to_string(),
            app_id.value(row).to_string(),
            session_id.value(row).to_string(),
        );

        let meta_entry = metadata.entry(key.clone()).or_insert_with(|| Metadata {
            ts: i64::MAX,
            event_id: i64::MAX,
            user_id: None,
            agent_impl: None,
            agent_version: None,
        });
        if (ts.value(row), event_id.value(row)) < (meta_entry.ts, meta_entry.event_id) {
            *meta_entry = Metadata {
                ts: ts.value(row),
                event_id: event_id.value(row),
                user_id: opt_str(user_id, row).map(str::to_string),
                agent_impl: opt_str(agent_impl, row).map(str::to_string),
                agent_version: opt_str(agent_version, row).map(str::to_string),
            };
        }

        if kind.value(row) != event_type::ERROR {
            continue;
        }
        let idx = opt_i64(turn_index, row);
        let sort_key = idx.unwrap_or(0);
        let candidate = FirstError {
            sort_key,
            turn_index: idx,
            error_type: opt_str(error_type, row).map(str::to_string),
        };
        match first_errors.entry(key) {
            Entry::Vacant(e) => {
                e.insert(candidate);
            }
            Entry::Occupied(mut e) => {
                // Row order breaks ties, so strictly-smaller only.
                if candidate.sort_key < e.get().sort_key {
                    e.insert(candidate);
                }
            }
        }
    }
    Ok((first_errors, metadata))
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use traj_catalog::fixtures::{events_batch, EventRow};
    use traj_catalog::schema::event_type;

    use crate::turn_index::assign_turn_index;
    use crate::turns::build_turns;

    use super::build_sessions;

    fn derive(rows: &[EventRow]) -> (RecordBatch, RecordBatch) {
        let indexed = assign_turn_index(&events_batch(rows).expect("batch")).expect("assign");
        let turns = build_turns(&indexed).expect("turns");
        (turns, indexed)
    }

    #[test]
    fn sums_turns_and_carries_metadata_from_first_event() {
        let (turns, raw) = derive(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, event_type::TURN_START)
                .meta("u1", "react-agent", "1.2.0"),
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, event_type::LLM_REQUEST)
                .request("r1", "m-large", 100),
            EventRow::new("2026-02-08", "app1", "s1", 3, 3_000, event_type::TURN_START),
            EventRow::new("2026-02-08", "app1", "s1", 4, 4_000, event_type::LLM_REQUEST)
                .request("r2", "m-large", 30),
        ]);
        let sessions = build_sessions(&turns, &raw).expect("sessions");
        assert_eq!(sessions.num_rows(), 1);
        let turns_count = sessions
            .column_by_name("turns_count")
            .expect("turns_count")
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64");
        assert_eq!(turns_count.value(0), 2);
        let input = sessions
            .column_by_name("input_tokens")
            .expect("input_tokens")
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64");
        assert_eq!(input.value(0), 130);
        let user = sessions
            .column_by_name("user_id")
            .expect("user_id")
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(user.value(0), "u1");
    }

    #[test]
    fn first_error_picks_the_earliest_turn() {
        let (turns, raw) = derive(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, event_type::TURN_START),
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, event_type::ERROR)
                .error("timeout", "E_TIMEOUT"),
            EventRow::new("2026-02-08", "app1", "s1", 3, 3_000, event_type::TURN_START),
            EventRow::new("2026-02-08", "app1", "s1", 4, 4_000, event_type::ERROR)
                .error("crash", "E_CRASH"),
        ]);
        let sessions = build_sessions(&turns, &raw).expect("sessions");
        let err_turn = sessions
            .column_by_name("first_error_turn_index")
            .expect("first_error_turn_index")
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64");
        assert_eq!(err_turn.value(0), 1);
        let err_type = sessions
            .column_by_name("first_error_type")
            .expect("first_error_type")
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(err_type.value(0), "timeout");
    }

    #[test]
    fn indexless_error_outranks_indexed_errors() {
        let (turns, raw) = derive(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, event_type::ERROR)
                .error("auth", "E_AUTH"),
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, event_type::TURN_START),
            EventRow::new("2026-02-08", "app1", "s1", 3, 3_000, event_type::ERROR)
                .error("timeout", "E_TIMEOUT"),
        ]);
        let sessions = build_sessions(&turns, &raw).expect("sessions");
        assert_eq!(sessions.num_rows(), 1);
        // An error ahead of the first turn_start carries no turn index; it
        // ranks before every indexed error.
        assert!(sessions
            .column_by_name("first_error_turn_index")
            .expect("first_error_turn_index")
            .is_null(0));
        let err_type = sessions
            .column_by_name("first_error_type")
            .expect("first_error_type")
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(err_type.value(0), "auth");
    }

    #[test]
    fn error_free_session_has_null_error_pointer() {
        let (turns, raw) = derive(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, event_type::TURN_START),
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, "message"),
        ]);
        let sessions = build_sessions(&turns, &raw).expect("sessions");
        assert!(sessions
            .column_by_name("first_error_turn_index")
            .expect("first_error_turn_index")
            .is_null(0));
        assert!(sessions
            .column_by_name("first_error_type")
            .expect("first_error_type")
            .is_null(0));
    }
}
