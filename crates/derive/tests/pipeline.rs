//! End-to-end derivation over a temp lake root, verified through the local
//! SQL engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use duckdb::types::Value;
use traj_catalog::fixtures::{events_batch, EventRow};
use traj_catalog::schema::event_type;
use traj_catalog::{default_catalog, write_partitioned, ReadFilters, WriteMode};
use traj_common::EngineConfig;
use traj_derive::DerivePipeline;
use traj_engine::{LocalEngine, TableRegistry};
use traj_exec::ExecContext;

fn temp_lake() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("traj_pipeline_{nanos}"))
}

#[test]
fn two_interleaved_sessions_derive_end_to_end() {
    let root = temp_lake();
    let catalog = Arc::new(default_catalog(&root, "v2"));

    // Sessions A and B interleaved in one batch. A: a turn with one model
    // span (100/50 tokens, 2000 ms) and a failing tool call. B: a turn with
    // nothing but a message.
    let batch = events_batch(&[
        EventRow::new("2026-02-08", "app1", "A", 1, 1_000, event_type::TURN_START)
            .meta("u1", "react-agent", "1.2.0"),
        EventRow::new("2026-02-08", "app1", "B", 2, 1_500, event_type::TURN_START)
            .meta("u2", "react-agent", "1.2.0"),
        EventRow::new("2026-02-08", "app1", "A", 3, 2_000, event_type::LLM_REQUEST)
            .request("r1", "m-large", 100),
        EventRow::new("2026-02-08", "app1", "B", 4, 2_500, "message"),
        EventRow::new("2026-02-08", "app1", "A", 5, 4_000, event_type::LLM_RESPONSE)
            .response("r1", 50, 2_000),
        EventRow::new("2026-02-08", "app1", "A", 6, 5_000, event_type::TOOL_CALL)
            .tool_call("t1", "bash"),
        EventRow::new("2026-02-08", "app1", "A", 7, 6_000, event_type::TOOL_RESULT)
            .tool_result("t1", 900, 1),
    ])
    .expect("batch");
    let spec = catalog.get("raw_events").expect("spec");
    write_partitioned(
        &[batch],
        std::path::Path::new(&spec.path),
        &["dt", "app_id", "session_id"],
        WriteMode::Append,
    )
    .expect("seed raw events");

    let config = EngineConfig {
        staging_dir: root.join("staging").to_string_lossy().into_owned(),
        ..EngineConfig::default()
    };
    let pipeline = DerivePipeline::new(ExecContext::new(catalog.clone(), config));
    let filters = ReadFilters::exact_date("2026-02-08");
    let report = pipeline.run(Some(&filters)).expect("pipeline run");
    assert_eq!(report.tables["turns"].rows, 2);
    assert_eq!(report.tables["model_spans"].rows, 1);
    assert_eq!(report.tables["tool_calls"].rows, 1);
    assert_eq!(report.tables["sessions"].rows, 2);
    assert_eq!(report.tables["errors"].rows, 0);

    let engine = LocalEngine::new().expect("engine");
    let registry = TableRegistry::new(catalog);
    for table in ["turns", "model_spans", "tool_calls", "sessions"] {
        engine
            .register_table(&registry, table, Some(&filters))
            .expect("register");
    }

    let turns = engine
        .sql(
            "SELECT session_id, status, model_spans_count, tool_calls_count \
             FROM turns ORDER BY session_id",
            &[],
        )
        .expect("turns query");
    assert_eq!(turns.num_rows(), 2);
    assert_eq!(turns.value(0, "session_id"), Some(&Value::Text("A".to_string())));
    assert_eq!(turns.value(0, "status"), Some(&Value::Text("fail".to_string())));
    assert_eq!(turns.value(0, "model_spans_count"), Some(&Value::BigInt(1)));
    assert_eq!(turns.value(0, "tool_calls_count"), Some(&Value::BigInt(1)));
    assert_eq!(turns.value(1, "session_id"), Some(&Value::Text("B".to_string())));
    assert_eq!(turns.value(1, "status"), Some(&Value::Text("success".to_string())));
    assert_eq!(turns.value(1, "model_spans_count"), Some(&Value::BigInt(0)));
    assert_eq!(turns.value(1, "tool_calls_count"), Some(&Value::BigInt(0)));

    // 50 output tokens over 2000 ms -> 25 tokens per second.
    let spans = engine
        .sql("SELECT session_id, otps FROM model_spans", &[])
        .expect("spans query");
    assert_eq!(spans.num_rows(), 1);
    assert_eq!(spans.value(0, "session_id"), Some(&Value::Text("A".to_string())));
    assert_eq!(spans.value(0, "otps"), Some(&Value::Double(25.0)));

    let tools = engine
        .sql("SELECT session_id, status FROM tool_calls", &[])
        .expect("tools query");
    assert_eq!(tools.num_rows(), 1);
    assert_eq!(tools.value(0, "status"), Some(&Value::Text("error".to_string())));

    let sessions = engine
        .sql(
            "SELECT session_id, status, turns_count, user_id \
             FROM sessions ORDER BY session_id",
            &[],
        )
        .expect("sessions query");
    assert_eq!(sessions.num_rows(), 2);
    assert_eq!(sessions.value(0, "status"), Some(&Value::Text("fail".to_string())));
    assert_eq!(sessions.value(0, "user_id"), Some(&Value::Text("u1".to_string())));
    assert_eq!(sessions.value(1, "status"), Some(&Value::Text("success".to_string())));
    assert_eq!(sessions.value(1, "turns_count"), Some(&Value::BigInt(1)));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn empty_scan_derives_nothing() {
    let root = temp_lake();
    let catalog = Arc::new(default_catalog(&root, "v2"));
    let config = EngineConfig {
        staging_dir: root.join("staging").to_string_lossy().into_owned(),
        ..EngineConfig::default()
    };
    let pipeline = DerivePipeline::new(ExecContext::new(catalog, config));
    let report = pipeline.run(None).expect("pipeline run");
    assert!(report.tables.is_empty());
    let _ = std::fs::remove_dir_all(root);
}
