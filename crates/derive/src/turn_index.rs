//! Turn-index assignment: the stateful pass everything downstream depends on.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, UInt32Array};
use arrow::compute::take;
use arrow::record_batch::RecordBatch;
use traj_catalog::schema::{col, event_type};
use traj_common::{Result, TrajError};

use crate::events::{i64_col, str_col, ts_col};

/// Assign a turn index to every event.
///
/// Rows are stably sorted by `(session_id, ts, event_id)` and a per-session
/// counter runs over them: an explicit `turn_index` re-anchors the counter,
/// a `turn_start` increments it before assignment, every other row takes the
/// current value. Rows still at counter 0 stay null (indexless) and are
/// skipped by turn aggregation.
///
/// Only correct when every event of a session is present in the batch; the
/// counter cannot resume across batches.
pub fn assign_turn_index(batch: &RecordBatch) -> Result<RecordBatch> {
    let session_id = str_col(batch, col::SESSION_ID)?;
    let ts = ts_col(batch, col::TS)?;
    let event_id = i64_col(batch, col::EVENT_ID)?;
    let kind = str_col(batch, col::EVENT_TYPE)?;
    let explicit = i64_col(batch, col::TURN_INDEX)?;

    let mut order: Vec<usize> = (0..batch.num_rows()).collect();
    order.sort_by(|&a, &b| {
        session_id
            .value(a)
            .cmp(session_id.value(b))
            .then(ts.value(a).cmp(&ts.value(b)))
            .then(event_id.value(a).cmp(&event_id.value(b)))
    });

    let mut counters: HashMap<&str, i64> = HashMap::new();
    let mut assigned: Vec<Option<i64>> = Vec::with_capacity(order.len());
    for &row in &order {
        let counter = counters.entry(session_id.value(row)).or_insert(0);
        if explicit.is_valid(row) {
            *counter = explicit.value(row);
        } else if kind.value(row) == event_type::TURN_START {
            *counter += 1;
        }
        assigned.push((*counter != 0).then_some(*counter));
    }

    let indices = UInt32Array::from(order.iter().map(|&i| i as u32).collect::<Vec<u32>>());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (i, field) in batch.schema().fields().iter().enumerate() {
        if field.name() == col::TURN_INDEX {
            columns.push(Arc::new(Int64Array::from(assigned.clone())));
        } else {
            let taken = take(batch.column(i), &indices, None)
                .map_err(|e| TrajError::Execution(format!("turn-index reorder failed: {e}")))?;
            columns.push(taken);
        }
    }
    RecordBatch::try_new(batch.schema(), columns)
        .map_err(|e| TrajError::Execution(format!("turn-index rebuild failed: {e}")))
}

#[cfg(test)]
mod tests {
    use arrow::array::Int64Array;
    use traj_catalog::fixtures::{events_batch, EventRow};
    use traj_catalog::schema::col;

    use super::assign_turn_index;

    fn indices(batch: &arrow::record_batch::RecordBatch) -> Vec<Option<i64>> {
        batch
            .column_by_name(col::TURN_INDEX)
            .expect("turn_index column")
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int64")
            .iter()
            .collect()
    }

    #[test]
    fn counter_runs_per_session_and_pre_start_rows_stay_indexless() {
        let batch = events_batch(&[
            // s1 interleaved with s2 in event order.
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, "message"),
            EventRow::new("2026-02-08", "app1", "s2", 2, 1_500, "turn_start"),
            EventRow::new("2026-02-08", "app1", "s1", 3, 2_000, "turn_start"),
            EventRow::new("2026-02-08", "app1", "s1", 4, 3_000, "llm_request"),
            EventRow::new("2026-02-08", "app1", "s1", 5, 4_000, "turn_start"),
            EventRow::new("2026-02-08", "app1", "s2", 6, 5_000, "message"),
        ])
        .expect("batch");
        let out = assign_turn_index(&batch).expect("assign");
        // Output is sorted by (session_id, ts, event_id): s1 rows then s2.
        assert_eq!(
            indices(&out),
            vec![None, Some(1), Some(1), Some(2), Some(1), Some(1)]
        );
    }

    #[test]
    fn explicit_index_re_anchors_the_counter() {
        let mut anchored = EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, "message");
        anchored.turn_index = Some(7);
        let batch = events_batch(&[
            anchored,
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, "message"),
            EventRow::new("2026-02-08", "app1", "s1", 3, 3_000, "turn_start"),
        ])
        .expect("batch");
        let out = assign_turn_index(&batch).expect("assign");
        assert_eq!(indices(&out), vec![Some(7), Some(7), Some(8)]);
    }

    #[test]
    fn assignment_is_idempotent() {
        let batch = events_batch(&[
            EventRow::new("2026-02-08", "app1", "s1", 1, 1_000, "message"),
            EventRow::new("2026-02-08", "app1", "s1", 2, 2_000, "turn_start"),
            EventRow::new("2026-02-08", "app1", "s1", 3, 3_000, "llm_request"),
            EventRow::new("2026-02-08", "app1", "s1", 4, 4_000, "turn_start"),
        ])
        .expect("batch");
        let once = assign_turn_index(&batch).expect("assign");
        let twice = assign_turn_index(&once).expect("re-assign");
        assert_eq!(indices(&once), indices(&twice));
    }
}
