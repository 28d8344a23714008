//! Per-worker runtime resources.
//!
//! Each map worker owns one [`WorkerRuntime`] for its lifetime; the embedded
//! DuckDB connection inside it is created on first use, never pre-warmed, and
//! is reused across every batch routed to that worker.

use std::cell::OnceCell;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use traj_catalog::write::write_parquet_file;
use traj_common::{Result, TrajError};

static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lazily-constructed per-worker resources. Scoped to the worker, not the
/// batch; torn down when the worker thread ends.
pub struct WorkerRuntime {
    staging_dir: PathBuf,
    scratch_file: PathBuf,
    conn: OnceCell<Connection>,
}

impl WorkerRuntime {
    pub fn new(staging_dir: PathBuf) -> Self {
        let seq = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);
        let scratch_file = staging_dir.join(format!("worker-{seq}-scratch.parquet"));
        Self {
            staging_dir,
            scratch_file,
            conn: OnceCell::new(),
        }
    }

    /// The worker's embedded query connection, opened on first use.
    pub fn duckdb(&self) -> Result<&Connection> {
        if self.conn.get().is_none() {
            let conn = Connection::open_in_memory()
                .map_err(|e| TrajError::Execution(format!("duckdb open failed: {e}")))?;
            let _ = self.conn.set(conn);
        }
        Ok(self.conn.get().expect("connection initialized above"))
    }
}

/// One self-contained batch of rows handed to an operator, carrying the
/// worker-scoped runtime so the operator can escalate to declarative-query
/// transforms without re-creating the connection per invocation.
pub struct WorkerBatch<'a> {
    batch: RecordBatch,
    runtime: &'a WorkerRuntime,
}

impl<'a> WorkerBatch<'a> {
    pub fn new(batch: RecordBatch, runtime: &'a WorkerRuntime) -> Self {
        Self { batch, runtime }
    }

    pub fn arrow(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_arrow(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Register the batch under `view` on the worker's DuckDB connection and
    /// return the connection. The batch is staged through a per-worker
    /// scratch parquet file that is overwritten on every call.
    pub fn duckdb(&self, view: &str) -> Result<&'a Connection> {
        if view.is_empty()
            || !view
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(TrajError::Validation(format!(
                "invalid view name '{view}': expected [A-Za-z0-9_]+"
            )));
        }
        let conn = self.runtime.duckdb()?;
        fs::create_dir_all(&self.runtime.staging_dir)?;
        write_parquet_file(&self.batch, &self.runtime.scratch_file)?;
        let path = self
            .runtime
            .scratch_file
            .to_string_lossy()
            .replace('\'', "''");
        conn.execute_batch(&format!(
            "CREATE OR REPLACE VIEW {view} AS SELECT * FROM read_parquet('{path}')"
        ))
        .map_err(|e| TrajError::Execution(format!("duckdb view registration failed: {e}")))?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use super::{WorkerBatch, WorkerRuntime};

    fn temp_staging() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("traj_runtime_test_{nanos}"))
    }

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1_i64, 2, 3]))])
            .expect("batch")
    }

    #[test]
    fn sql_escalation_sees_the_batch_rows() {
        let staging = temp_staging();
        let runtime = WorkerRuntime::new(staging.clone());
        let wb = WorkerBatch::new(sample_batch(), &runtime);
        let conn = wb.duckdb("batch").expect("register view");
        let total: i64 = conn
            .query_row("SELECT SUM(v) FROM batch", [], |row| row.get(0))
            .expect("query");
        assert_eq!(total, 6);
        let _ = std::fs::remove_dir_all(staging);
    }

    #[test]
    fn connection_is_reused_across_batches() {
        let staging = temp_staging();
        let runtime = WorkerRuntime::new(staging.clone());
        let first = runtime.duckdb().expect("open") as *const _;
        let second = runtime.duckdb().expect("reuse") as *const _;
        assert_eq!(first, second);
        let _ = std::fs::remove_dir_all(staging);
    }

    #[test]
    fn rejects_hostile_view_names() {
        let staging = temp_staging();
        let runtime = WorkerRuntime::new(staging.clone());
        let wb = WorkerBatch::new(sample_batch(), &runtime);
        assert!(wb.duckdb("b; DROP TABLE x").is_err());
        let _ = std::fs::remove_dir_all(staging);
    }
}
