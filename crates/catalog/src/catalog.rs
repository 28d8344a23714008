use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use traj_common::{Result, TrajError};

/// Logical table descriptor mapping a name to physically partitioned storage.
///
/// Immutable once registered; the resolver and both engines only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    /// Table root directory; partition directories live underneath.
    pub path: String,
    pub format: String,
    pub schema_version: String,
    /// Ordered partition key set, e.g. `["dt", "app_id", "session_id"]`.
    pub partition_keys: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl TableSpec {
    pub fn is_partitioned_by(&self, key: &str) -> bool {
        self.partition_keys.iter().any(|k| k == key)
    }
}

/// Registry of logical table name -> [`TableSpec`].
///
/// Read-only after construction; registration is expected to happen once
/// during setup, never concurrently with reads.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<String, TableSpec>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Register a spec under a given name, overwriting any prior spec
    /// (last write wins). We override `spec.name` to avoid ambiguity.
    pub fn register(&mut self, name: impl Into<String>, mut spec: TableSpec) {
        let name = name.into();
        spec.name = name.clone();
        self.tables.insert(name, spec);
    }

    pub fn get(&self, name: &str) -> Result<&TableSpec> {
        self.tables.get(name).ok_or_else(|| {
            TrajError::NotFound(format!(
                "unknown table '{name}'; registered: {:?}",
                self.list()
            ))
        })
    }

    /// Registered table names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Load a catalog from a JSON array of table specs.
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let specs: Vec<TableSpec> =
            serde_json::from_str(&s).map_err(|e| TrajError::InvalidConfig(e.to_string()))?;
        let mut cat = Catalog::new();
        for spec in specs {
            cat.register(spec.name.clone(), spec);
        }
        Ok(cat)
    }
}

/// Build the standard lake catalog rooted at `lake_root`.
///
/// `raw_events` is the authoritative stream; everything else is derived.
pub fn default_catalog(lake_root: impl AsRef<Path>, schema_version: &str) -> Catalog {
    let root = lake_root.as_ref();
    let spec = |name: &str, rel: &str, keys: &[&str], desc: &str| TableSpec {
        name: name.to_string(),
        path: root.join(rel).to_string_lossy().into_owned(),
        format: "parquet".to_string(),
        schema_version: schema_version.to_string(),
        partition_keys: keys.iter().map(|k| k.to_string()).collect(),
        description: desc.to_string(),
    };

    let mut cat = Catalog::new();
    for table in [
        spec(
            "raw_events",
            "raw/events",
            &["dt", "app_id", "session_id"],
            "Authoritative canonical event stream.",
        ),
        spec(
            "model_spans",
            "derived/model_spans",
            &["dt", "app_id"],
            "Matched llm request/response pairs.",
        ),
        spec(
            "tool_calls",
            "derived/tool_calls",
            &["dt", "app_id"],
            "Matched tool call/result pairs.",
        ),
        spec(
            "turns",
            "derived/turns",
            &["dt", "app_id"],
            "Per-turn aggregates.",
        ),
        spec(
            "sessions",
            "derived/sessions",
            &["dt", "app_id"],
            "Per-session aggregates.",
        ),
        spec(
            "errors",
            "derived/errors",
            &["dt", "app_id", "error_type"],
            "Normalized error events.",
        ),
    ] {
        cat.register(table.name.clone(), table);
    }
    cat
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> TableSpec {
        TableSpec {
            name: name.to_string(),
            path: format!("/lake/{name}"),
            format: "parquet".to_string(),
            schema_version: "v2".to_string(),
            partition_keys: vec!["dt".to_string(), "app_id".to_string()],
            description: String::new(),
        }
    }

    #[test]
    fn register_get_round_trip() {
        let mut cat = Catalog::new();
        let s = spec("turns");
        cat.register("turns", s.clone());
        assert_eq!(cat.get("turns").expect("registered"), &s);
    }

    #[test]
    fn register_same_name_keeps_later_spec() {
        let mut cat = Catalog::new();
        cat.register("turns", spec("turns"));
        let mut later = spec("turns");
        later.path = "/elsewhere/turns".to_string();
        cat.register("turns", later.clone());
        assert_eq!(cat.get("turns").expect("registered"), &later);
        assert_eq!(cat.list(), vec!["turns".to_string()]);
    }

    #[test]
    fn unknown_table_error_lists_registered_names() {
        let mut cat = Catalog::new();
        cat.register("sessions", spec("sessions"));
        cat.register("turns", spec("turns"));
        let err = cat.get("nope").expect_err("must fail");
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("sessions"));
        assert!(msg.contains("turns"));
    }

    #[test]
    fn default_catalog_registers_standard_tables() {
        let cat = default_catalog("/lake", "v2");
        for name in [
            "raw_events",
            "model_spans",
            "tool_calls",
            "turns",
            "sessions",
            "errors",
        ] {
            let spec = cat.get(name).expect("standard table");
            assert_eq!(spec.format, "parquet");
            assert!(spec.is_partitioned_by("dt"));
        }
        assert!(cat.get("raw_events").expect("raw").is_partitioned_by("session_id"));
        assert!(!cat.get("turns").expect("turns").is_partitioned_by("session_id"));
    }
}
