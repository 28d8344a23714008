//! Partition-pattern expansion and parquet scanning.
//!
//! Patterns come from [`crate::filters::resolve_partition_paths`] and contain
//! `*` wildcards in directory or file segments (plus the `**` whole-table
//! form). Missing directories or files mean "no data for that partition",
//! never an error.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;
use traj_common::{Result, TrajError};

/// Expand a set of path patterns to the concrete files they match,
/// deduplicated and sorted for deterministic scan order.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        expand_pattern(pattern, &mut files)?;
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn expand_pattern(pattern: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    let mut saw_wildcard = false;
    for comp in Path::new(pattern).components() {
        let seg = comp.as_os_str().to_string_lossy().into_owned();
        if !saw_wildcard && !seg.contains('*') {
            base.push(&seg);
        } else {
            saw_wildcard = true;
            rest.push(seg);
        }
    }
    if rest.is_empty() {
        // Fully literal pattern: treat as a single file path.
        if base.is_file() {
            out.push(base);
        }
        return Ok(());
    }
    walk(&base, &rest, out)
}

fn walk(dir: &Path, segments: &[String], out: &mut Vec<PathBuf>) -> Result<()> {
    if segments.is_empty() || !dir.is_dir() {
        return Ok(());
    }
    let seg = &segments[0];
    let is_last = segments.len() == 1;

    if seg == "**" {
        // Recursive descent; the next segment is the file pattern.
        let file_pat = segments
            .get(1)
            .ok_or_else(|| TrajError::InvalidConfig("'**' requires a file pattern".to_string()))?;
        walk_recursive(dir, file_pat, out)?;
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !segment_matches(seg, &name) {
            continue;
        }
        let path = entry.path();
        if is_last {
            if path.is_file() {
                out.push(path);
            }
        } else if path.is_dir() {
            walk(&path, &segments[1..], out)?;
        }
    }
    Ok(())
}

fn walk_recursive(dir: &Path, file_pat: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_recursive(&path, file_pat, out)?;
        } else if segment_matches(file_pat, &entry.file_name().to_string_lossy()) {
            out.push(path);
        }
    }
    Ok(())
}

/// Match one path segment against a pattern with `*` wildcards.
fn segment_matches(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Total on-disk size of all files matched by `patterns`.
pub fn patterns_size_bytes(patterns: &[String]) -> Result<u64> {
    let mut total = 0;
    for file in expand_patterns(patterns)? {
        total += fs::metadata(&file)?.len();
    }
    Ok(total)
}

/// Read all parquet files matched by `patterns` into record batches.
///
/// Each file contributes its batches in file order; an empty match set
/// yields an empty vec.
pub fn scan_patterns(patterns: &[String], batch_size: usize) -> Result<Vec<RecordBatch>> {
    let files = expand_patterns(patterns)?;
    debug!(patterns = patterns.len(), files = files.len(), "partition scan");
    let mut batches = Vec::new();
    for file in &files {
        batches.extend(read_parquet_file(file, batch_size)?);
    }
    Ok(batches)
}

/// Read one parquet file into record batches.
pub fn read_parquet_file(path: &Path, batch_size: usize) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| TrajError::Execution(format!("parquet reader build failed: {e}")))?
        .with_batch_size(batch_size)
        .build()
        .map_err(|e| TrajError::Execution(format!("parquet reader open failed: {e}")))?;
    let mut out = Vec::new();
    for batch in reader {
        out.push(batch.map_err(|e| TrajError::Execution(format!("parquet decode failed: {e}")))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::segment_matches;

    #[test]
    fn literal_and_wildcard_segments() {
        assert!(segment_matches("dt=2026-02-08", "dt=2026-02-08"));
        assert!(!segment_matches("dt=2026-02-08", "dt=2026-02-09"));
        assert!(segment_matches("app_id=*", "app_id=app1"));
        assert!(!segment_matches("app_id=*", "session_id=s1"));
        assert!(segment_matches("*", "anything"));
        assert!(segment_matches("*.parquet", "part-0.parquet"));
        assert!(!segment_matches("*.parquet", "part-0.json"));
    }
}
