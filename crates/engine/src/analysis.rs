//! The unit-of-analysis contract the runner dispatches on.

use std::collections::HashMap;

use arrow::record_batch::RecordBatch;
use serde_json::Value as JsonValue;
use traj_catalog::ReadFilters;
use traj_common::Result;

use crate::distributed::DistributedEngine;
use crate::local::LocalEngine;
use crate::registry::TableRegistry;
use crate::rowset::RowSet;

/// Inputs to one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisParams {
    /// Partition filters applied to every input table.
    pub filters: Option<ReadFilters>,
    /// Caller-supplied scan-size override; when absent the runner estimates
    /// from the input tables' resolved files.
    pub estimated_scan_bytes: Option<u64>,
    /// Free-form per-unit options.
    pub options: HashMap<String, JsonValue>,
}

/// One named output table of an analysis, in whichever representation the
/// engine that ran it naturally produces.
#[derive(Debug, Clone)]
pub enum AnalysisTable {
    Rows(RowSet),
    Batches(Vec<RecordBatch>),
}

impl AnalysisTable {
    pub fn num_rows(&self) -> usize {
        match self {
            AnalysisTable::Rows(rs) => rs.num_rows(),
            AnalysisTable::Batches(batches) => batches.iter().map(|b| b.num_rows()).sum(),
        }
    }
}

/// What an analysis run produced.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub tables: HashMap<String, AnalysisTable>,
    /// Named locations of any files the unit wrote (reports, exports).
    pub artifacts: HashMap<String, String>,
}

impl AnalysisResult {
    pub fn with_table(mut self, name: impl Into<String>, table: AnalysisTable) -> Self {
        self.tables.insert(name.into(), table);
        self
    }
}

/// A unit of analysis runnable on either engine.
///
/// The runner picks the engine; the unit supplies one implementation per
/// engine, each expected to produce semantically identical results.
pub trait AnalysisUnit: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Catalog tables the unit reads. The runner registers these as views
    /// before a local run and uses them for scan-size estimation.
    fn input_tables(&self) -> &'static [&'static str];

    /// Force the dataset engine regardless of scan size.
    fn requires_distributed(&self) -> bool {
        false
    }

    fn run_local(
        &self,
        engine: &LocalEngine,
        registry: &TableRegistry,
        params: &AnalysisParams,
    ) -> Result<AnalysisResult>;

    fn run_distributed(
        &self,
        engine: &DistributedEngine,
        params: &AnalysisParams,
    ) -> Result<AnalysisResult>;
}
