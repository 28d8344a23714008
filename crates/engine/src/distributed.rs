//! Parallel dataset engine.
//!
//! Wraps the execution context: reads resolve to one block per parquet file,
//! operators run across the worker pool, writes go back through the catalog.

use std::sync::Arc;

use traj_catalog::{Catalog, ReadFilters, WriteMode, WriteReport};
use traj_common::{EngineConfig, Result};
use traj_exec::{Dataset, ExecContext, Operator};

use crate::engine::{Engine, EngineKind};

pub struct DistributedEngine {
    ctx: ExecContext,
}

impl Engine for DistributedEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Distributed
    }
}

impl DistributedEngine {
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self {
            ctx: ExecContext::new(catalog, config),
        }
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn read(&self, table: &str, filters: Option<&ReadFilters>) -> Result<Dataset> {
        self.ctx.read(table, filters)
    }

    pub fn apply(
        &self,
        op: &dyn Operator,
        ds: &Dataset,
    ) -> Result<std::collections::HashMap<String, Dataset>> {
        self.ctx.apply(op, ds)
    }

    /// Write a dataset to a catalog table, partitioned by the spec's keys.
    pub fn write(&self, ds: &Dataset, table: &str, mode: WriteMode) -> Result<WriteReport> {
        self.ctx.write(ds, table, None, None, mode)
    }
}
