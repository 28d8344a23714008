//! Catalog-backed table access shared by both engines.

use std::sync::Arc;

use traj_catalog::scan::patterns_size_bytes;
use traj_catalog::{resolve_partition_paths, Catalog, ReadFilters};
use traj_common::Result;

/// Resolves logical tables to scannable path sets for either engine.
pub struct TableRegistry {
    catalog: Arc<Catalog>,
}

impl TableRegistry {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Path patterns covering `table` under `filters`.
    pub fn resolved_patterns(
        &self,
        table: &str,
        filters: Option<&ReadFilters>,
    ) -> Result<Vec<String>> {
        let spec = self.catalog.get(table)?;
        resolve_partition_paths(spec, filters)
    }

    /// A `read_parquet` scan expression over the resolved patterns, usable
    /// as the body of a view definition.
    pub fn duckdb_scan_sql(&self, table: &str, filters: Option<&ReadFilters>) -> Result<String> {
        let patterns = self.resolved_patterns(table, filters)?;
        let quoted: Vec<String> = patterns
            .iter()
            .map(|p| format!("'{}'", p.replace('\'', "''")))
            .collect();
        Ok(format!(
            "SELECT * FROM read_parquet([{}])",
            quoted.join(", ")
        ))
    }

    /// On-disk bytes the resolved patterns would scan. Drives engine choice.
    pub fn estimated_scan_bytes(
        &self,
        table: &str,
        filters: Option<&ReadFilters>,
    ) -> Result<u64> {
        let patterns = self.resolved_patterns(table, filters)?;
        patterns_size_bytes(&patterns)
    }
}
