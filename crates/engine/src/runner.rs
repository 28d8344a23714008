//! Engine selection and analysis dispatch.

use std::sync::Arc;

use tracing::info;
use traj_catalog::Catalog;
use traj_common::{global_metrics, EngineConfig, Result};

use crate::analysis::{AnalysisParams, AnalysisResult, AnalysisUnit};
use crate::distributed::DistributedEngine;
use crate::engine::EngineKind;
use crate::local::LocalEngine;
use crate::registry::TableRegistry;

/// Runs analysis units, choosing the engine per run.
///
/// Selection rule: a unit that requires the dataset engine always gets it;
/// otherwise the estimated scan size decides, with anything at or above the
/// configured threshold routed to the dataset engine.
pub struct Runner {
    config: EngineConfig,
    registry: TableRegistry,
    local: LocalEngine,
    distributed: DistributedEngine,
}

impl Runner {
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig) -> Result<Self> {
        Ok(Self {
            registry: TableRegistry::new(catalog.clone()),
            local: LocalEngine::new()?,
            distributed: DistributedEngine::new(catalog, config.clone()),
            config,
        })
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn choose(&self, requires_distributed: bool, estimated_scan_bytes: u64) -> EngineKind {
        if requires_distributed
            || estimated_scan_bytes >= self.config.distributed_scan_threshold_bytes
        {
            EngineKind::Distributed
        } else {
            EngineKind::Local
        }
    }

    /// Run one unit end to end: estimate scan size, pick the engine,
    /// dispatch.
    pub fn run(&self, unit: &dyn AnalysisUnit, params: &AnalysisParams) -> Result<AnalysisResult> {
        let scan_bytes = match params.estimated_scan_bytes {
            Some(bytes) => bytes,
            None => self.estimate_scan_bytes(unit, params)?,
        };
        let kind = self.choose(unit.requires_distributed(), scan_bytes);
        global_metrics().inc_engine_selected(kind.as_str());
        info!(unit = unit.name(), engine = %kind, scan_bytes, "dispatch analysis");

        match kind {
            EngineKind::Local => {
                for table in unit.input_tables() {
                    self.local
                        .register_table(&self.registry, table, params.filters.as_ref())?;
                }
                unit.run_local(&self.local, &self.registry, params)
            }
            EngineKind::Distributed => unit.run_distributed(&self.distributed, params),
        }
    }

    fn estimate_scan_bytes(
        &self,
        unit: &dyn AnalysisUnit,
        params: &AnalysisParams,
    ) -> Result<u64> {
        let mut total = 0;
        for table in unit.input_tables() {
            total += self
                .registry
                .estimated_scan_bytes(table, params.filters.as_ref())?;
        }
        Ok(total)
    }
}
