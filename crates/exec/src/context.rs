//! Execution context: catalog-backed dataset IO and operator application,
//! including the multi-output fan-out mechanism.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{new_null_array, ArrayRef, Scalar, StringArray};
use arrow::compute::{concat_batches, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tracing::debug;
use traj_catalog::scan::read_parquet_file;
use traj_catalog::{
    expand_patterns, resolve_partition_paths, write_partitioned, Catalog, ReadFilters, WriteMode,
    WriteReport,
};
use traj_common::{global_metrics, EngineConfig, Result, TrajError};

use crate::dataset::{Dataset, MapBatchesOptions};
use crate::operator::{normalize_output, Operator};

/// Reserved discriminator column tagging which logical output a row belongs
/// to when multiple outputs are merged into one physical batch.
pub const OUTPUT_COLUMN: &str = "__output__";

/// Applies operators to datasets and moves data in and out of the catalog.
pub struct ExecContext {
    pub catalog: Arc<Catalog>,
    pub config: EngineConfig,
}

impl ExecContext {
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    fn staging_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.staging_dir)
    }

    /// Read a table into a dataset, one block per matched parquet file.
    pub fn read(&self, table: &str, filters: Option<&ReadFilters>) -> Result<Dataset> {
        let spec = self.catalog.get(table)?;
        if spec.format.to_lowercase() != "parquet" {
            return Err(TrajError::Unsupported(format!(
                "format not supported: {} (table '{table}')",
                spec.format
            )));
        }
        let patterns = resolve_partition_paths(spec, filters)?;
        let files = expand_patterns(&patterns)?;
        global_metrics().record_files_scanned(table, files.len() as u64);
        debug!(table, files = files.len(), "context read");

        let mut blocks = Vec::new();
        for file in &files {
            blocks.extend(read_parquet_file(file, self.config.batch_size_rows)?);
        }
        Ok(Dataset::new(blocks))
    }

    /// Write a dataset back through the catalog.
    ///
    /// Partition columns default to the spec's partition keys; `path`
    /// overrides the spec's location when given.
    pub fn write(
        &self,
        ds: &Dataset,
        table: &str,
        path: Option<&Path>,
        partition_by: Option<&[&str]>,
        mode: WriteMode,
    ) -> Result<WriteReport> {
        let spec = self.catalog.get(table)?;
        let default_keys: Vec<&str> = spec.partition_keys.iter().map(|k| k.as_str()).collect();
        let cols = partition_by.unwrap_or(&default_keys);
        let root = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(&spec.path));

        let report = write_partitioned(ds.blocks(), &root, cols, mode)?;
        global_metrics().record_table_write(table, report.bytes);
        debug!(table, rows = report.rows, files = report.files, "context write");
        Ok(report)
    }

    /// Apply an operator to a dataset, materializing one dataset per
    /// declared output.
    ///
    /// Multi-output operators are fanned out through a single tagged stream:
    /// every row is annotated with [`OUTPUT_COLUMN`], all outputs are
    /// concatenated per batch, and the caller-visible datasets are recovered
    /// by filtering on the tag and dropping the column. An invocation with
    /// zero rows across all outputs still emits a well-formed tagged batch,
    /// so every declared output is always materializable.
    pub fn apply(&self, op: &dyn Operator, ds: &Dataset) -> Result<HashMap<String, Dataset>> {
        let declared = op.outputs();
        if declared.is_empty() {
            return Err(TrajError::Validation(format!(
                "operator '{}' declares no outputs",
                op.name()
            )));
        }
        let opts = MapBatchesOptions {
            batch_size_rows: op.batch_size().unwrap_or(self.config.batch_size_rows),
            worker_slots: self.config.worker_slots,
            staging_dir: self.staging_dir(),
        };
        debug!(operator = op.name(), outputs = declared.len(), "apply operator");

        if let [single] = declared {
            let mapped = ds.map_batches(&opts, |wb| {
                let started = Instant::now();
                let rows_in = wb.num_rows() as u64;
                let mut out = normalize_output(op.transform(self, wb)?, declared)?;
                let table = out.remove(*single).expect("validated output key");
                global_metrics().record_operator(
                    op.name(),
                    rows_in,
                    table.num_rows() as u64,
                    started.elapsed().as_secs_f64(),
                );
                Ok(table)
            })?;
            return Ok(HashMap::from([(single.to_string(), mapped)]));
        }

        let tagged = ds.map_batches(&opts, |wb| {
            let started = Instant::now();
            let rows_in = wb.num_rows() as u64;
            let out = normalize_output(op.transform(self, wb)?, declared)?;
            let merged = fanout_concat(&out, declared)?;
            global_metrics().record_operator(
                op.name(),
                rows_in,
                merged.num_rows() as u64,
                started.elapsed().as_secs_f64(),
            );
            Ok(merged)
        })?;

        let mut result = HashMap::with_capacity(declared.len());
        for name in declared {
            result.insert(name.to_string(), split_output(&tagged, name)?);
        }
        Ok(result)
    }
}

/// Merge one invocation's named outputs into a single tagged batch.
fn fanout_concat(
    outputs: &HashMap<String, RecordBatch>,
    declared: &[&str],
) -> Result<RecordBatch> {
    // Union schema over all outputs, field order = first occurrence in
    // declared-output order. Everything is nullable because a field present
    // in one output is null-padded in the others.
    let mut union_fields: Vec<Field> = Vec::new();
    for name in declared {
        let table = &outputs[*name];
        for field in table.schema().fields() {
            if field.name() == OUTPUT_COLUMN {
                return Err(TrajError::Validation(format!(
                    "output '{name}' uses reserved column '{OUTPUT_COLUMN}'"
                )));
            }
            match union_fields.iter().find(|f| f.name() == field.name()) {
                Some(existing) if existing.data_type() != field.data_type() => {
                    return Err(TrajError::Execution(format!(
                        "column '{}' has conflicting types across outputs: {:?} vs {:?}",
                        field.name(),
                        existing.data_type(),
                        field.data_type()
                    )));
                }
                Some(_) => {}
                None => union_fields.push(Field::new(
                    field.name().clone(),
                    field.data_type().clone(),
                    true,
                )),
            }
        }
    }

    let mut tagged_fields = union_fields.clone();
    tagged_fields.push(Field::new(OUTPUT_COLUMN, DataType::Utf8, false));
    let tagged_schema = Arc::new(Schema::new(tagged_fields));

    if union_fields.is_empty() {
        // Degenerate all-schemaless case: a zero-row batch that still carries
        // the discriminator column.
        return RecordBatch::try_new(
            tagged_schema,
            vec![Arc::new(StringArray::from(Vec::<String>::new())) as ArrayRef],
        )
        .map_err(|e| TrajError::Execution(format!("fan-out batch build failed: {e}")));
    }

    let mut pieces = Vec::with_capacity(declared.len());
    for name in declared {
        let table = &outputs[*name];
        let rows = table.num_rows();
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(union_fields.len() + 1);
        for field in &union_fields {
            match table.column_by_name(field.name()) {
                Some(col) => columns.push(col.clone()),
                None => columns.push(new_null_array(field.data_type(), rows)),
            }
        }
        columns.push(Arc::new(StringArray::from(vec![name.to_string(); rows])));
        pieces.push(
            RecordBatch::try_new(tagged_schema.clone(), columns)
                .map_err(|e| TrajError::Execution(format!("fan-out tagging failed: {e}")))?,
        );
    }
    concat_batches(&tagged_schema, pieces.iter())
        .map_err(|e| TrajError::Execution(format!("fan-out concat failed: {e}")))
}

/// Recover one logical output from a tagged dataset: filter on the
/// discriminator value, then drop the discriminator column.
fn split_output(tagged: &Dataset, name: &str) -> Result<Dataset> {
    let mut blocks = Vec::new();
    for block in tagged.blocks() {
        let tag_idx = block
            .schema()
            .fields()
            .iter()
            .position(|f| f.name() == OUTPUT_COLUMN)
            .ok_or_else(|| {
                TrajError::Execution(format!(
                    "fan-out batch is missing the '{OUTPUT_COLUMN}' column"
                ))
            })?;
        let tags = block
            .column(tag_idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                TrajError::Execution(format!("'{OUTPUT_COLUMN}' column must be utf8"))
            })?;

        let scalar = Scalar::new(StringArray::from(vec![name]));
        let mask = arrow::compute::kernels::cmp::eq(tags, &scalar)
            .map_err(|e| TrajError::Execution(format!("fan-out filter failed: {e}")))?;
        let filtered = filter_record_batch(block, &mask)
            .map_err(|e| TrajError::Execution(format!("fan-out filter failed: {e}")))?;

        let keep: Vec<usize> = (0..filtered.num_columns()).filter(|i| *i != tag_idx).collect();
        if keep.is_empty() {
            // Degenerate tag-only block carries no schema worth keeping.
            continue;
        }
        let projected = filtered
            .project(&keep)
            .map_err(|e| TrajError::Execution(format!("fan-out projection failed: {e}")))?;
        blocks.push(projected);
    }
    Ok(Dataset::new(blocks))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use arrow::array::{BooleanArray, Int64Array, StringArray};
    use arrow::compute::filter_record_batch;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use traj_catalog::Catalog;
    use traj_common::EngineConfig;

    use super::{ExecContext, OUTPUT_COLUMN};
    use crate::dataset::Dataset;
    use crate::operator::{Operator, OperatorOutput};
    use crate::runtime::WorkerBatch;

    fn test_ctx() -> ExecContext {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let config = EngineConfig {
            worker_slots: 2,
            staging_dir: std::env::temp_dir()
                .join(format!("traj_ctx_{nanos}"))
                .to_string_lossy()
                .into_owned(),
            ..EngineConfig::default()
        };
        ExecContext::new(Arc::new(Catalog::new()), config)
    }

    fn int_batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).expect("batch")
    }

    /// Splits an int column into even and odd rows.
    struct ParitySplit;

    impl Operator for ParitySplit {
        fn name(&self) -> &'static str {
            "parity_split"
        }

        fn outputs(&self) -> &'static [&'static str] {
            &["even", "odd"]
        }

        fn transform(
            &self,
            _ctx: &ExecContext,
            batch: &mut WorkerBatch<'_>,
        ) -> traj_common::Result<OperatorOutput> {
            let input = batch.arrow();
            let values = input
                .column(0)
                .as_any()
                .downcast_ref::<Int64Array>()
                .expect("int column");
            let even_mask: BooleanArray =
                values.iter().map(|v| v.map(|v| v % 2 == 0)).collect();
            let odd_mask: BooleanArray =
                values.iter().map(|v| v.map(|v| v % 2 != 0)).collect();
            Ok(OperatorOutput::Named(HashMap::from([
                (
                    "even".to_string(),
                    filter_record_batch(input, &even_mask).expect("filter"),
                ),
                (
                    "odd".to_string(),
                    filter_record_batch(input, &odd_mask).expect("filter"),
                ),
            ])))
        }
    }

    /// Emits an output name that was never declared.
    struct WrongKeys;

    impl Operator for WrongKeys {
        fn name(&self) -> &'static str {
            "wrong_keys"
        }

        fn outputs(&self) -> &'static [&'static str] {
            &["even", "odd"]
        }

        fn transform(
            &self,
            _ctx: &ExecContext,
            batch: &mut WorkerBatch<'_>,
        ) -> traj_common::Result<OperatorOutput> {
            Ok(OperatorOutput::Named(HashMap::from([(
                "mystery".to_string(),
                batch.arrow().clone(),
            )])))
        }
    }

    /// Produces a table colliding with the reserved discriminator column.
    struct ReservedCollision;

    impl Operator for ReservedCollision {
        fn name(&self) -> &'static str {
            "reserved_collision"
        }

        fn outputs(&self) -> &'static [&'static str] {
            &["a", "b"]
        }

        fn transform(
            &self,
            _ctx: &ExecContext,
            _batch: &mut WorkerBatch<'_>,
        ) -> traj_common::Result<OperatorOutput> {
            let schema = Arc::new(Schema::new(vec![Field::new(
                OUTPUT_COLUMN,
                DataType::Utf8,
                true,
            )]));
            let bad = RecordBatch::try_new(
                schema,
                vec![Arc::new(StringArray::from(vec!["x"])) as _],
            )
            .expect("batch");
            Ok(OperatorOutput::Named(HashMap::from([
                ("a".to_string(), bad.clone()),
                ("b".to_string(), bad),
            ])))
        }
    }

    #[test]
    fn multi_output_fan_out_splits_rows_by_output() {
        let ctx = test_ctx();
        let ds = Dataset::new(vec![int_batch(vec![1, 2, 3, 4]), int_batch(vec![5, 6])]);
        let out = ctx.apply(&ParitySplit, &ds).expect("apply");
        assert_eq!(out.len(), 2);
        assert_eq!(out["even"].num_rows(), 3);
        assert_eq!(out["odd"].num_rows(), 3);
        for dataset in out.values() {
            let schema = dataset.schema().expect("schema");
            assert!(schema.column_with_name(OUTPUT_COLUMN).is_none());
            assert!(schema.column_with_name("v").is_some());
        }
    }

    #[test]
    fn multi_output_on_empty_batch_materializes_every_output() {
        let ctx = test_ctx();
        let ds = Dataset::new(vec![int_batch(vec![])]);
        let out = ctx.apply(&ParitySplit, &ds).expect("apply");
        assert_eq!(out.len(), 2);
        for name in ["even", "odd"] {
            let dataset = &out[name];
            assert_eq!(dataset.num_rows(), 0);
            // The output is a valid (empty) table, not an absent key.
            assert!(dataset.schema().expect("schema").column_with_name("v").is_some());
        }
    }

    #[test]
    fn wrong_output_keys_fail_the_batch() {
        let ctx = test_ctx();
        let ds = Dataset::new(vec![int_batch(vec![1])]);
        let err = ctx.apply(&WrongKeys, &ds).expect_err("must fail");
        assert!(matches!(err, traj_common::TrajError::Validation(_)));
    }

    #[test]
    fn reserved_discriminator_collision_fails() {
        let ctx = test_ctx();
        let ds = Dataset::new(vec![int_batch(vec![1])]);
        let err = ctx.apply(&ReservedCollision, &ds).expect_err("must fail");
        assert!(err.to_string().contains(OUTPUT_COLUMN));
    }

    /// Single-output operator used to exercise the non-fan-out path.
    struct Passthrough;

    impl Operator for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }

        fn outputs(&self) -> &'static [&'static str] {
            &["out"]
        }

        fn batch_size(&self) -> Option<usize> {
            Some(2)
        }

        fn transform(
            &self,
            _ctx: &ExecContext,
            batch: &mut WorkerBatch<'_>,
        ) -> traj_common::Result<OperatorOutput> {
            Ok(OperatorOutput::Single(batch.arrow().clone()))
        }
    }

    #[test]
    fn single_output_respects_operator_batch_size() {
        let ctx = test_ctx();
        let ds = Dataset::new(vec![int_batch(vec![1, 2, 3, 4, 5])]);
        let out = ctx.apply(&Passthrough, &ds).expect("apply");
        let mapped = &out["out"];
        assert_eq!(mapped.num_rows(), 5);
        // 5 rows re-chunked at operator batch size 2 -> 3 invocations.
        assert_eq!(mapped.blocks().len(), 3);
    }
}
