//! Batch-transform operator contract.

use std::collections::HashMap;

use arrow::record_batch::RecordBatch;
use traj_common::{Result, TrajError};

use crate::context::ExecContext;
use crate::runtime::WorkerBatch;

/// What a transform invocation produced for one batch.
///
/// `Single` is only valid for operators declaring exactly one output;
/// `Named` keys must exactly equal the declared output names.
pub enum OperatorOutput {
    Single(RecordBatch),
    Named(HashMap<String, RecordBatch>),
}

/// A batch transformation that runs identically on either engine.
///
/// Operators declare one or more named outputs and transform one
/// self-contained batch at a time. Production of the declared outputs is
/// all-or-nothing per batch: a malformed output fails the whole invocation.
///
/// Operators that keep per-session state (turn counters) are only correct
/// when every event of a session lands in the same batch; callers must shard
/// input by session or run them on a single block.
pub trait Operator: Send + Sync {
    /// Stable operator name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Declared output names, at least one.
    fn outputs(&self) -> &'static [&'static str];

    /// Preferred batch size; the context default applies when `None`.
    fn batch_size(&self) -> Option<usize> {
        None
    }

    fn transform(&self, ctx: &ExecContext, batch: &mut WorkerBatch<'_>) -> Result<OperatorOutput>;
}

/// Validate a transform's output against the declared output names and
/// normalize it to a name -> table mapping.
pub fn normalize_output(
    out: OperatorOutput,
    declared: &[&str],
) -> Result<HashMap<String, RecordBatch>> {
    match out {
        OperatorOutput::Named(map) => {
            let mut actual: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            actual.sort_unstable();
            let mut expected: Vec<&str> = declared.to_vec();
            expected.sort_unstable();
            if actual != expected {
                return Err(TrajError::Validation(format!(
                    "operator outputs {actual:?} do not match declared {expected:?}"
                )));
            }
            Ok(map)
        }
        OperatorOutput::Single(batch) => {
            if declared.len() != 1 {
                return Err(TrajError::Validation(format!(
                    "single-table output requires exactly one declared output, got {declared:?}"
                )));
            }
            Ok(HashMap::from([(declared[0].to_string(), batch)]))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use super::{normalize_output, OperatorOutput};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1_i64, 2]))])
            .expect("batch")
    }

    #[test]
    fn single_output_normalizes_under_declared_name() {
        let out = normalize_output(OperatorOutput::Single(batch()), &["out"]).expect("normalize");
        assert_eq!(out.len(), 1);
        assert_eq!(out["out"].num_rows(), 2);
    }

    #[test]
    fn single_output_with_multiple_declared_names_fails() {
        let err = normalize_output(OperatorOutput::Single(batch()), &["turns", "errors"])
            .expect_err("must fail");
        assert!(matches!(err, traj_common::TrajError::Validation(_)));
    }

    #[test]
    fn named_output_key_mismatch_fails_with_both_key_sets() {
        let named = OperatorOutput::Named(HashMap::from([("wrong".to_string(), batch())]));
        let err = normalize_output(named, &["turns", "errors"]).expect_err("must fail");
        let msg = err.to_string();
        assert!(msg.contains("wrong"));
        assert!(msg.contains("turns"));
        assert!(msg.contains("errors"));
    }

    #[test]
    fn named_output_matching_keys_passes_through() {
        let named = OperatorOutput::Named(HashMap::from([
            ("turns".to_string(), batch()),
            ("errors".to_string(), batch()),
        ]));
        let out = normalize_output(named, &["turns", "errors"]).expect("normalize");
        assert_eq!(out.len(), 2);
    }
}
