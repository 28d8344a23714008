//! Embedded SQL engine.
//!
//! One in-memory DuckDB connection per engine instance; catalog tables are
//! exposed as views over their resolved parquet path sets, so queries see
//! exactly the partitions the filters selected.

use duckdb::types::Value;
use duckdb::{Connection, ToSql};
use tracing::debug;
use traj_catalog::ReadFilters;
use traj_common::{Result, TrajError};

use crate::engine::{Engine, EngineKind};
use crate::registry::TableRegistry;
use crate::rowset::RowSet;

pub struct LocalEngine {
    conn: Connection,
}

impl Engine for LocalEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Local
    }
}

impl LocalEngine {
    pub fn new() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TrajError::Execution(format!("duckdb open failed: {e}")))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Expose a catalog table as a view named after the table.
    pub fn register_table(
        &self,
        registry: &TableRegistry,
        table: &str,
        filters: Option<&ReadFilters>,
    ) -> Result<()> {
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(TrajError::Validation(format!(
                "invalid table name '{table}': expected [A-Za-z0-9_]+"
            )));
        }
        let scan = registry.duckdb_scan_sql(table, filters)?;
        debug!(table, "register local view");
        self.conn
            .execute_batch(&format!("CREATE OR REPLACE VIEW {table} AS {scan}"))
            .map_err(|e| {
                TrajError::Execution(format!("view registration for '{table}' failed: {e}"))
            })
    }

    /// Run a query and materialize the full result.
    pub fn sql(&self, query: &str, params: &[&dyn ToSql]) -> Result<RowSet> {
        let mut stmt = self
            .conn
            .prepare(query)
            .map_err(|e| TrajError::Execution(format!("sql prepare failed: {e}")))?;
        let mut rows = stmt
            .query(params)
            .map_err(|e| TrajError::Execution(format!("sql execution failed: {e}")))?;

        let mut out: Vec<Vec<Value>> = Vec::new();
        let mut width = 0;
        while let Some(row) = rows
            .next()
            .map_err(|e| TrajError::Execution(format!("sql row fetch failed: {e}")))?
        {
            if width == 0 {
                width = row.as_ref().column_count();
            }
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let v: Value = row
                    .get(i)
                    .map_err(|e| TrajError::Execution(format!("sql value decode failed: {e}")))?;
                values.push(v);
            }
            out.push(values);
        }
        drop(rows);

        let columns = stmt
            .column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        Ok(RowSet {
            columns,
            rows: out,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use duckdb::types::Value;
    use traj_catalog::fixtures::{events_batch, EventRow};
    use traj_catalog::{default_catalog, write_partitioned, ReadFilters, WriteMode};

    use super::LocalEngine;
    use crate::registry::TableRegistry;

    fn temp_lake() -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("traj_local_engine_{nanos}"))
    }

    #[test]
    fn sql_over_registered_catalog_table() {
        let root = temp_lake();
        let catalog = Arc::new(default_catalog(&root, "v2"));
        let batch = events_batch(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, "turn_start"),
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, "llm_request")
                .request("r1", "m-large", 100),
            EventRow::new("2026-02-08", "app1", "s2", 3, 3_000, "turn_start"),
        ])
        .expect("batch");
        let spec = catalog.get("raw_events").expect("spec");
        write_partitioned(
            &[batch],
            std::path::Path::new(&spec.path),
            &["dt", "app_id", "session_id"],
            WriteMode::Append,
        )
        .expect("write");

        let engine = LocalEngine::new().expect("engine");
        let registry = TableRegistry::new(catalog);
        let filters = ReadFilters::exact_date("2026-02-08");
        engine
            .register_table(&registry, "raw_events", Some(&filters))
            .expect("register");

        let rs = engine
            .sql(
                "SELECT session_id, COUNT(*) AS events FROM raw_events \
                 WHERE event_type = ? GROUP BY session_id ORDER BY session_id",
                &[&"turn_start"],
            )
            .expect("query");
        assert_eq!(rs.columns, vec!["session_id".to_string(), "events".to_string()]);
        assert_eq!(rs.num_rows(), 2);
        assert_eq!(rs.value(0, "session_id"), Some(&Value::Text("s1".to_string())));
        assert_eq!(rs.value(1, "events"), Some(&Value::BigInt(1)));

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn hostile_table_names_are_rejected() {
        let engine = LocalEngine::new().expect("engine");
        let registry = TableRegistry::new(Arc::new(default_catalog("/lake", "v2")));
        assert!(engine
            .register_table(&registry, "x; DROP VIEW y", None)
            .is_err());
    }
}
