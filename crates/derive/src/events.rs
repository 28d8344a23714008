//! Typed column access over canonical-event batches.

use arrow::array::{Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use traj_common::{Result, TrajError};

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn arrow::array::Array> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| TrajError::Execution(format!("event batch is missing column '{name}'")))
}

pub(crate) fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| TrajError::Execution(format!("column '{name}' is not utf8")))
}

pub(crate) fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| TrajError::Execution(format!("column '{name}' is not int64")))
}

pub(crate) fn ts_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a TimestampMillisecondArray> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| TrajError::Execution(format!("column '{name}' is not timestamp[ms]")))
}

/// Optional string value at a row.
pub(crate) fn opt_str(arr: &StringArray, row: usize) -> Option<&str> {
    arr.is_valid(row).then(|| arr.value(row))
}

/// Optional int value at a row.
pub(crate) fn opt_i64(arr: &Int64Array, row: usize) -> Option<i64> {
    arr.is_valid(row).then(|| arr.value(row))
}
