//! Partitioned parquet writer.
//!
//! Layout follows the hive-style `<root>/dt=<date>/app_id=<app>[/...]`
//! convention. Partition columns are kept in the data files as well as the
//! directory names so both engines can scan files without reconstructing
//! values from paths.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::array::{Array, ArrayRef, StringArray, UInt32Array};
use arrow::compute::{concat_batches, take};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use tracing::debug;
use traj_common::{Result, TrajError};

/// Overwrite deletes everything under the destination before writing;
/// append adds new files without deleting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub files: usize,
    pub rows: u64,
    pub bytes: u64,
}

/// Write `batches` under `root`, split into one directory per distinct
/// partition-key tuple. An empty `partition_cols` writes directly at `root`.
pub fn write_partitioned(
    batches: &[RecordBatch],
    root: &Path,
    partition_cols: &[&str],
    mode: WriteMode,
) -> Result<WriteReport> {
    if mode == WriteMode::Overwrite && root.exists() {
        fs::remove_dir_all(root)?;
    }

    let mut report = WriteReport::default();
    let non_empty: Vec<&RecordBatch> = batches.iter().filter(|b| b.num_rows() > 0).collect();
    if non_empty.is_empty() {
        return Ok(report);
    }
    let schema = non_empty[0].schema();

    // BTreeMap keeps partition directories in a deterministic order.
    let mut groups: BTreeMap<Vec<String>, Vec<RecordBatch>> = BTreeMap::new();
    for batch in &non_empty {
        if partition_cols.is_empty() {
            groups.entry(Vec::new()).or_default().push((*batch).clone());
            continue;
        }
        split_batch(batch, partition_cols, &mut groups)?;
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| TrajError::Execution(format!("clock before epoch: {e}")))?
        .as_nanos();

    for (seq, (key, group)) in groups.iter().enumerate() {
        let mut dir = root.to_path_buf();
        for (col, value) in partition_cols.iter().zip(key) {
            dir.push(format!("{col}={value}"));
        }
        fs::create_dir_all(&dir)?;

        let merged = concat_batches(&schema, group.iter())
            .map_err(|e| TrajError::Execution(format!("partition concat failed: {e}")))?;
        let path = dir.join(format!("part-{stamp}-{seq}.parquet"));
        write_parquet_file(&merged, &path)?;

        report.files += 1;
        report.rows += merged.num_rows() as u64;
        report.bytes += fs::metadata(&path)?.len();
    }

    debug!(
        root = %root.display(),
        files = report.files,
        rows = report.rows,
        "partitioned write"
    );
    Ok(report)
}

fn split_batch(
    batch: &RecordBatch,
    partition_cols: &[&str],
    groups: &mut BTreeMap<Vec<String>, Vec<RecordBatch>>,
) -> Result<()> {
    let mut key_arrays: Vec<&StringArray> = Vec::with_capacity(partition_cols.len());
    for col in partition_cols {
        let array = batch.column_by_name(col).ok_or_else(|| {
            TrajError::InvalidConfig(format!("partition column '{col}' missing from batch"))
        })?;
        let strings = array.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
            TrajError::Unsupported(format!("partition column '{col}' must be utf8"))
        })?;
        key_arrays.push(strings);
    }

    let mut by_key: BTreeMap<Vec<String>, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let mut key = Vec::with_capacity(key_arrays.len());
        for (col, array) in partition_cols.iter().zip(&key_arrays) {
            if array.is_null(row) {
                return Err(TrajError::InvalidConfig(format!(
                    "null value in partition column '{col}'"
                )));
            }
            key.push(array.value(row).to_string());
        }
        by_key.entry(key).or_default().push(row as u32);
    }

    for (key, rows) in by_key {
        let sub = take_rows(batch, &rows)?;
        groups.entry(key).or_default().push(sub);
    }
    Ok(())
}

/// Materialize the given row indices of a batch as a new batch.
pub fn take_rows(batch: &RecordBatch, rows: &[u32]) -> Result<RecordBatch> {
    let indices = UInt32Array::from(rows.to_vec());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for col in batch.columns() {
        let taken = take(col.as_ref(), &indices, None)
            .map_err(|e| TrajError::Execution(format!("take failed: {e}")))?;
        columns.push(taken);
    }
    RecordBatch::try_new(batch.schema(), columns)
        .map_err(|e| TrajError::Execution(format!("batch rebuild failed: {e}")))
}

/// Write one batch as a single parquet file.
pub fn write_parquet_file(batch: &RecordBatch, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .map_err(|e| TrajError::Execution(format!("parquet writer init failed: {e}")))?;
    writer
        .write(batch)
        .map_err(|e| TrajError::Execution(format!("parquet write failed: {e}")))?;
    writer
        .close()
        .map_err(|e| TrajError::Execution(format!("parquet close failed: {e}")))?;
    Ok(())
}
