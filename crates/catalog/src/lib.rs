//! Table catalog, partition resolution, and partitioned parquet IO.
//!
//! Architecture role:
//! - maps logical table names to physically partitioned storage
//! - resolves partition-filter predicates into a minimal path set
//! - reads/writes the hive-style `dt=/app_id=/session_id=` layout
//!
//! Key modules:
//! - [`catalog`]
//! - [`filters`]
//! - [`schema`] (canonical event columns)
//! - [`scan`] / [`write`]
//! - [`fixtures`] (test/bench event builders)

pub mod catalog;
pub mod filters;
pub mod fixtures;
pub mod scan;
pub mod schema;
pub mod write;

pub use catalog::{default_catalog, Catalog, TableSpec};
pub use filters::{resolve_partition_paths, ReadFilters};
pub use scan::{expand_patterns, patterns_size_bytes, scan_patterns};
pub use write::{write_partitioned, WriteMode, WriteReport};
