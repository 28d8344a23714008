//! Engine identity shared by the runner and metrics.

use std::fmt;

/// Which execution engine a unit of work runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Embedded single-process SQL engine.
    Local,
    /// Parallel dataset engine for scans too large for one connection.
    Distributed,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Local => "local",
            EngineKind::Distributed => "distributed",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tag shared by both engine implementations, so callers can
/// branch on the active engine without naming concrete types.
pub trait Engine {
    fn kind(&self) -> EngineKind;
}
