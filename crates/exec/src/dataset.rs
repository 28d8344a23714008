//! Sharded in-memory dataset handle and the parallel batch-mapping primitive.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use traj_common::{Result, TrajError};

use crate::runtime::{WorkerBatch, WorkerRuntime};

/// Options for [`Dataset::map_batches`].
#[derive(Debug, Clone)]
pub struct MapBatchesOptions {
    /// Maximum rows per batch handed to the transform.
    pub batch_size_rows: usize,
    /// Number of parallel workers.
    pub worker_slots: usize,
    /// Scratch directory for per-worker staging files.
    pub staging_dir: PathBuf,
}

/// An ordered list of record-batch blocks.
///
/// Blocks are the scheduling unit: `map_batches` hands each block to exactly
/// one worker invocation and no invocation observes another block's state.
/// Block order is preserved through every transformation.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    blocks: Vec<RecordBatch>,
}

impl Dataset {
    pub fn new(blocks: Vec<RecordBatch>) -> Self {
        Self { blocks }
    }

    pub fn empty() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn blocks(&self) -> &[RecordBatch] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<RecordBatch> {
        self.blocks
    }

    pub fn num_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.num_rows()).sum()
    }

    /// Schema of the first block, if any.
    pub fn schema(&self) -> Option<SchemaRef> {
        self.blocks.first().map(|b| b.schema())
    }

    /// Concatenate every block into one batch. `None` for a block-less
    /// dataset.
    pub fn concat(&self) -> Result<Option<RecordBatch>> {
        let schema = match self.schema() {
            Some(s) => s,
            None => return Ok(None),
        };
        let merged = concat_batches(&schema, self.blocks.iter())
            .map_err(|e| TrajError::Execution(format!("dataset concat failed: {e}")))?;
        Ok(Some(merged))
    }

    /// Split blocks larger than `batch_size_rows`. Blocks are never merged,
    /// so caller-established shard boundaries (e.g. by session) survive.
    pub fn rechunk(&self, batch_size_rows: usize) -> Vec<RecordBatch> {
        let limit = batch_size_rows.max(1);
        let mut out = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            if block.num_rows() <= limit {
                out.push(block.clone());
                continue;
            }
            let mut offset = 0;
            while offset < block.num_rows() {
                let len = limit.min(block.num_rows() - offset);
                out.push(block.slice(offset, len));
                offset += len;
            }
        }
        out
    }

    /// Apply `f` to every block in parallel across a bounded worker pool.
    ///
    /// Each worker owns one lazily-initialized [`WorkerRuntime`] reused for
    /// all blocks it claims; output block order matches input block order.
    pub fn map_batches<F>(&self, opts: &MapBatchesOptions, f: F) -> Result<Dataset>
    where
        F: Fn(&mut WorkerBatch<'_>) -> Result<RecordBatch> + Send + Sync,
    {
        let jobs = self.rechunk(opts.batch_size_rows);
        if jobs.is_empty() {
            return Ok(Dataset::empty());
        }

        let workers = opts.worker_slots.max(1).min(jobs.len());
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<RecordBatch>>>> =
            (0..jobs.len()).map(|_| Mutex::new(None)).collect();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let runtime = WorkerRuntime::new(opts.staging_dir.clone());
                    loop {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        if i >= jobs.len() {
                            break;
                        }
                        let mut batch = WorkerBatch::new(jobs[i].clone(), &runtime);
                        let out = f(&mut batch);
                        *slots[i].lock().expect("result slot lock") = Some(out);
                    }
                });
            }
        });

        let mut blocks = Vec::with_capacity(jobs.len());
        for slot in slots {
            let result = slot
                .into_inner()
                .expect("result slot lock")
                .expect("every claimed job stores a result");
            blocks.push(result?);
        }
        Ok(Dataset::new(blocks))
    }
}
