use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use traj_common::{Result, TrajError};

use crate::catalog::TableSpec;

/// Optional predicate narrowing which partition paths a read scans.
///
/// Filters only narrow the path set; they are never applied as row-level
/// predicates by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFilters {
    /// Exact date (`YYYY-MM-DD`). Takes precedence over the range bounds.
    pub dt: Option<String>,
    /// Inclusive range start.
    pub dt_from: Option<String>,
    /// Inclusive range end.
    pub dt_to: Option<String>,
    pub app_id: Option<String>,
    pub session_id: Option<String>,
}

impl ReadFilters {
    pub fn exact_date(dt: impl Into<String>) -> Self {
        Self {
            dt: Some(dt.into()),
            ..Self::default()
        }
    }

    pub fn date_range(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            dt_from: Some(from.into()),
            dt_to: Some(to.into()),
            ..Self::default()
        }
    }
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| TrajError::InvalidConfig(format!("invalid date filter '{s}': {e}")))
}

fn iso_dates(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = start;
    while cur <= end {
        out.push(cur.format("%Y-%m-%d").to_string());
        cur = cur.succ_opt().expect("date within supported range");
    }
    out
}

/// Resolve the minimal ordered set of partition path patterns to scan.
///
/// - no filters: one wildcard pattern over the whole table
/// - exact date or range: one pattern per day, ascending; a single range
///   bound is treated as the sole date
/// - segments follow the spec's partition keys in order; keys the filters
///   cannot narrow (including keys beyond dt/app/session, e.g. `error_type`)
///   stay wildcarded; an inverted range degrades to an empty set, never an
///   error
pub fn resolve_partition_paths(
    spec: &TableSpec,
    filters: Option<&ReadFilters>,
) -> Result<Vec<String>> {
    let root = Path::new(&spec.path);
    let filters = match filters {
        Some(f) => f,
        None => return Ok(vec![root.join("**").join("*.parquet").to_string_lossy().into_owned()]),
    };

    let days: Vec<String> = if let Some(dt) = &filters.dt {
        vec![parse_day(dt)?.format("%Y-%m-%d").to_string()]
    } else if let (Some(from), Some(to)) = (&filters.dt_from, &filters.dt_to) {
        iso_dates(parse_day(from)?, parse_day(to)?)
    } else if let Some(from) = &filters.dt_from {
        vec![parse_day(from)?.format("%Y-%m-%d").to_string()]
    } else if let Some(to) = &filters.dt_to {
        vec![parse_day(to)?.format("%Y-%m-%d").to_string()]
    } else {
        vec!["*".to_string()]
    };

    let app = filters.app_id.as_deref().unwrap_or("*");
    let session = filters.session_id.as_deref().unwrap_or("*");

    let mut out = Vec::with_capacity(days.len());
    for day in days {
        let mut path = root.to_path_buf();
        for key in &spec.partition_keys {
            let segment = match key.as_str() {
                "dt" => format!("dt={day}"),
                "app_id" => format!("app_id={app}"),
                "session_id" => format!("session_id={session}"),
                other => format!("{other}=*"),
            };
            path = path.join(segment);
        }
        out.push(path.join("*.parquet").to_string_lossy().into_owned());
    }
    Ok(out)
}
