//! High-level runner API for the taxi trip ingester.
//!
//! Fetches the source file, connects to the database and streams the file
//! into the destination table. This is the entry point used by the CLI.

use std::path::PathBuf;
use tracing::info;

use crate::db::{self as db_pool, Pool, PoolArgs};
use crate::error::LoadError;
use crate::io::{Fetcher, SourceUri};
use crate::loader::{ChunkedLoader, ColumnTransforms};

pub use crate::config::{DEFAULT_BATCH_SIZE, OUTPUT_FILE_NAME};
pub use crate::loader::LoadSummary;
pub use crate::telemetry::ProgressStats;

/// Arguments for one ingest run
#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub pool_args: PoolArgs,
    pub table_name: String,
    /// HTTP(S) URL or local path of the gzip CSV
    pub source_url: String,
    /// Where the fetched file is written before loading
    pub output_path: PathBuf,
    pub batch_size: usize,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<Pool>,
}

/// Fetch the source, then load it into `args.table_name`
///
/// The destination table is dropped and recreated from the file's first
/// batch, then every batch is appended in its own transaction. On failure the
/// returned [`LoadError`] tells whether anything was committed.
///
/// # Example
///
/// ```no_run
/// use taxi_ingest::db::PoolArgsBuilder;
/// use taxi_ingest::runner::{IngestArgs, run_ingest};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = IngestArgs {
///     pool_args: PoolArgsBuilder::default()
///         .user("root")
///         .password("root")
///         .host("localhost")
///         .database("ny_taxi")
///         .build()?,
///     table_name: "yellow_taxi_data".to_string(),
///     source_url: "https://example.com/yellow_tripdata_2021-01.csv.gz".to_string(),
///     output_path: "output.csv.gz".into(),
///     batch_size: 100_000,
/// };
///
/// let summary = run_ingest(args).await?;
/// println!("Loaded {} rows in {:?}", summary.rows_loaded, summary.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_ingest(args: IngestArgs) -> Result<LoadSummary, LoadError> {
    let fetch_error = |source: anyhow::Error| LoadError::Fetch {
        url: args.source_url.clone(),
        source,
    };

    let source_uri = SourceUri::parse(&args.source_url).map_err(fetch_error)?;
    let fetcher = Fetcher::new().map_err(fetch_error)?;
    let bytes = fetcher
        .fetch(&source_uri, &args.output_path)
        .await
        .map_err(fetch_error)?;
    info!(bytes, table = %args.table_name, "source fetched, starting load");

    // Create connection pool (or use test pool if provided)
    #[cfg(test)]
    let pool = match args.test_pool {
        Some(test_pool) => test_pool,
        None => connect(&args.pool_args).await?,
    };

    #[cfg(not(test))]
    let pool = connect(&args.pool_args).await?;

    ChunkedLoader::new(&pool, ColumnTransforms::nyc_taxi())
        .load(&args.output_path, &args.table_name, args.batch_size)
        .await
}

async fn connect(pool_args: &PoolArgs) -> Result<Pool, LoadError> {
    db_pool::pool::pool(pool_args)
        .await
        .map_err(LoadError::Connect)
}
