use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::transform::ColumnTransforms;
use crate::db::{Schema, SchemaInferrer, TableSink};
use crate::error::LoadError;
use crate::formats::{BatchSource, DelimitedBatchReader, DelimitedConfig, RecordBatch};
use crate::telemetry::{ProgressStats, TelemetryEvent};

/// Result of a completed load
#[derive(Debug)]
pub struct LoadSummary {
    pub table: String,
    pub batches: usize,
    pub rows_loaded: u64,
    pub duration: Duration,
    pub stats: ProgressStats,
}

/// Streams a source file into a table one batch at a time.
///
/// The first batch defines the table: it is transformed, its columns become
/// the table's columns, and the table is dropped and recreated before any
/// row is written. Every batch (the first included) is then transformed and
/// appended as its own transaction. A batch is fully appended before the
/// next one is read, so at most one batch is held in memory.
pub struct ChunkedLoader<'a> {
    sink: &'a dyn TableSink,
    transforms: ColumnTransforms,
}

impl<'a> ChunkedLoader<'a> {
    pub fn new(sink: &'a dyn TableSink, transforms: ColumnTransforms) -> Self {
        Self { sink, transforms }
    }

    /// Load a CSV (optionally gzip-compressed) file into `table_name`
    pub async fn load(
        &self,
        source_path: &Path,
        table_name: &str,
        batch_size: usize,
    ) -> Result<LoadSummary, LoadError> {
        let mut batches = DelimitedBatchReader::open(source_path, DelimitedConfig::csv(), batch_size)
            .map_err(|source| LoadError::Open {
                path: source_path.to_path_buf(),
                source,
            })?;

        info!(
            path = %source_path.display(),
            table = table_name,
            columns = batches.columns().len(),
            batch_size,
            "loading source file"
        );

        self.load_from(&mut batches, table_name).await
    }

    /// Load every batch of an already opened source into `table_name`
    pub async fn load_from<S>(
        &self,
        batches: &mut S,
        table_name: &str,
    ) -> Result<LoadSummary, LoadError>
    where
        S: BatchSource + ?Sized,
    {
        let start_time = Instant::now();
        let mut stats = ProgressStats::new();

        let first = batches
            .next_batch()
            .map_err(|source| LoadError::Read {
                batch_number: 1,
                rows_committed: 0,
                source,
            })?
            .ok_or(LoadError::EmptySource)?;
        let first = self.transform(first, &stats)?;

        let schema = SchemaInferrer::infer_from_batch(&first, &self.transforms);
        self.create_table(table_name, &schema, &mut stats).await?;

        let mut pending = Some(first);
        while let Some(batch) = pending.take() {
            self.append(table_name, &schema, batch, &mut stats).await?;

            pending = match batches.next_batch() {
                Ok(Some(batch)) => Some(self.transform(batch, &stats)?),
                Ok(None) => None,
                Err(source) => {
                    return Err(LoadError::Read {
                        batch_number: stats.last_batch + 1,
                        rows_committed: stats.records_loaded,
                        source,
                    });
                }
            };
        }

        let duration = start_time.elapsed();
        let (p50, p90, p99) = stats.get_percentiles();
        info!(
            table = table_name,
            batches = stats.batches_loaded,
            rows = stats.records_loaded,
            p50_ms = p50.unwrap_or(0),
            p90_ms = p90.unwrap_or(0),
            p99_ms = p99.unwrap_or(0),
            "finished inserting all chunks in {:.2}s",
            duration.as_secs_f64()
        );

        Ok(LoadSummary {
            table: table_name.to_string(),
            batches: stats.batches_loaded,
            rows_loaded: stats.records_loaded,
            duration,
            stats,
        })
    }

    fn transform(&self, batch: RecordBatch, stats: &ProgressStats) -> Result<RecordBatch, LoadError> {
        let batch_number = batch.batch_index + 1;
        debug!(batch = batch_number, rows = batch.len(), "transforming batch");

        self.transforms
            .apply(batch)
            .map_err(|source| LoadError::Transform {
                batch_number,
                rows_committed: stats.records_loaded,
                source,
            })
    }

    async fn create_table(
        &self,
        table_name: &str,
        schema: &Schema,
        stats: &mut ProgressStats,
    ) -> Result<(), LoadError> {
        self.sink
            .create_or_replace_table(table_name, schema)
            .await
            .map_err(|source| LoadError::CreateTable {
                table: table_name.to_string(),
                source,
            })?;

        info!(
            table = table_name,
            columns = ?schema.column_names(),
            "created table"
        );
        stats.update(&TelemetryEvent::TableCreated {
            columns: schema.columns.len(),
        });
        Ok(())
    }

    /// Append one batch; the batch is dropped once it is committed
    async fn append(
        &self,
        table_name: &str,
        schema: &Schema,
        batch: RecordBatch,
        stats: &mut ProgressStats,
    ) -> Result<(), LoadError> {
        let batch_number = batch.batch_index + 1;
        let start = Instant::now();

        let records_loaded = self
            .sink
            .append_rows(table_name, schema, &batch)
            .await
            .map_err(|source| LoadError::Append {
                batch_number,
                rows_committed: stats.records_loaded,
                source,
            })?;

        let elapsed = start.elapsed();
        info!(
            batch = batch_number,
            rows = records_loaded,
            "inserted another chunk, took {:.3} seconds",
            elapsed.as_secs_f64()
        );

        stats.update(&TelemetryEvent::BatchLoaded {
            batch_number,
            records_loaded,
            duration_ms: elapsed.as_millis() as u64,
        });
        Ok(())
    }
}
