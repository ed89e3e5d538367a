use anyhow::Result;
use async_trait::async_trait;

use super::schema::Schema;
use crate::formats::RecordBatch;

/// Table-level write operations the loader needs from a database
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Drop any table with this name and create it with the given columns
    async fn create_or_replace_table(&self, table_name: &str, schema: &Schema) -> Result<()>;

    /// Append every row of the batch as one all-or-nothing unit.
    /// Returns the number of rows written.
    async fn append_rows(&self, table_name: &str, schema: &Schema, batch: &RecordBatch)
    -> Result<u64>;
}
