use clap::Parser;
use taxi_ingest::db::PoolArgsBuilder;
use taxi_ingest::runner::{DEFAULT_BATCH_SIZE, IngestArgs, OUTPUT_FILE_NAME, run_ingest};

/// Ingest CSV data to Postgres
#[derive(Parser, Clone)]
#[command(version, about)]
struct Args {
    /// User name for Postgres
    #[arg(long)]
    user: String,

    /// Password for Postgres
    #[arg(long)]
    password: String,

    /// Host for Postgres
    #[arg(long)]
    host: String,

    /// Port for Postgres
    #[arg(long)]
    port: u16,

    /// Database name for Postgres
    #[arg(long)]
    database: String,

    /// Name of the table where results are written
    #[arg(long, alias = "table_name")]
    table_name: String,

    /// URL of the gzip CSV file
    #[arg(long)]
    url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("taxi_ingest=info,sqlx=warn"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let pool_args = PoolArgsBuilder::default()
        .user(args.user)
        .password(args.password)
        .host(args.host)
        .port(args.port)
        .database(args.database)
        .build()?;

    println!("Taxi Trip Ingest");
    println!("================");
    println!("Source: {}", args.url);
    println!("Table: {}", args.table_name);
    println!();

    let ingest_args = IngestArgs {
        pool_args,
        table_name: args.table_name,
        source_url: args.url,
        output_path: OUTPUT_FILE_NAME.into(),
        batch_size: DEFAULT_BATCH_SIZE,
    };

    // Any failure exits non-zero; the message says whether rows were committed
    let summary = run_ingest(ingest_args).await?;

    let (p50, p90, p99) = summary.stats.get_percentiles();
    println!();
    println!("Load Summary");
    println!("============");
    println!("Table: {}", summary.table);
    println!("Batches loaded: {}", summary.batches);
    println!("Records loaded: {}", summary.rows_loaded);
    println!("Duration: {:.2}s", summary.duration.as_secs_f64());
    println!(
        "Throughput: {:.2} records/sec",
        summary.rows_loaded as f64 / summary.duration.as_secs_f64()
    );
    if let (Some(p50), Some(p90), Some(p99)) = (p50, p90, p99) {
        println!("Batch latency: p50 {}ms, p90 {}ms, p99 {}ms", p50, p90, p99);
    }

    Ok(())
}
