//! Connection pool and the `TableSink` implementation on top of sqlx.
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use derive_builder::Builder;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions};
use sqlx::query::Query;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use super::schema::{Schema, SqlType, coerce_value, generate_insert, generate_replace_ddl};
use super::sink::TableSink;
use crate::config::{CONNECT_TIMEOUT, POSTGRES_MAX_BIND_PARAMS, QUERY_TIMEOUT};
use crate::formats::{RecordBatch, Value};

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(sqlx::PgPool),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Database handle used exclusively by one load run
#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

/// Connection settings for the destination Postgres database
#[derive(Builder, Clone)]
pub struct PoolArgs {
    #[builder(setter(into))]
    user: String,
    #[builder(setter(into))]
    password: String,
    #[builder(setter(into))]
    host: String,
    #[builder(default = "5432")]
    port: u16,
    #[builder(setter(into))]
    database: String,
    #[builder(default = "CONNECT_TIMEOUT")]
    connect_timeout: Duration,
}

impl PoolArgs {
    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }

    /// Connection URL with the password left out, safe for logs
    pub fn redacted_url(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for PoolArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolArgs")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Open a single-connection Postgres pool
pub async fn pool(args: &PoolArgs) -> Result<Pool> {
    tracing::info!(url = %args.redacted_url(), "connecting to database");

    let pg_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(args.connect_timeout)
        .connect_with(args.connect_options())
        .await
        .with_context(|| format!("Failed to connect to {}", args.redacted_url()))?;

    Ok(Pool {
        inner: PoolInner::Postgres(pg_pool),
    })
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        // A single connection keeps every query on the same in-memory database
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    /// The underlying SQLite pool of a test pool
    #[cfg(test)]
    pub fn sqlite(&self) -> &sqlx::SqlitePool {
        match &self.inner {
            PoolInner::Sqlite(pool) => pool,
            PoolInner::Postgres(_) => panic!("Not a SQLite pool"),
        }
    }

    /// Check if this pool is using PostgreSQL (returns false for SQLite)
    #[cfg(test)]
    pub fn is_postgres(&self) -> bool {
        matches!(&self.inner, PoolInner::Postgres(_))
    }

    /// Maximum number of bind parameters in a single statement
    fn max_bind_params(&self) -> usize {
        match &self.inner {
            PoolInner::Postgres(_) => POSTGRES_MAX_BIND_PARAMS,
            #[cfg(test)]
            PoolInner::Sqlite(_) => crate::config::SQLITE_MAX_BIND_PARAMS,
        }
    }
}

#[async_trait]
impl TableSink for Pool {
    async fn create_or_replace_table(&self, table_name: &str, schema: &Schema) -> Result<()> {
        if schema.columns.is_empty() {
            anyhow::bail!("Cannot create table '{}' without columns", table_name);
        }

        let statements = generate_replace_ddl(table_name, schema);

        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut tx = pool.begin().await.context("Failed to begin transaction")?;
                for sql in &statements {
                    with_timeout(sqlx::query(sql).execute(&mut *tx))
                        .await
                        .with_context(|| format!("Failed to execute DDL: {}", sql))?;
                }
                tx.commit().await.context("Failed to commit table creation")?;
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let mut tx = pool.begin().await.context("Failed to begin transaction")?;
                for sql in &statements {
                    with_timeout(sqlx::query(sql).execute(&mut *tx))
                        .await
                        .with_context(|| format!("Failed to execute DDL: {}", sql))?;
                }
                tx.commit().await.context("Failed to commit table creation")?;
            }
        }

        Ok(())
    }

    async fn append_rows(
        &self,
        table_name: &str,
        schema: &Schema,
        batch: &RecordBatch,
    ) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        if batch.columns.len() != schema.columns.len() {
            anyhow::bail!(
                "Batch has {} columns but table '{}' has {}",
                batch.columns.len(),
                table_name,
                schema.columns.len()
            );
        }

        // Split into statements that stay under the bind parameter limit;
        // all of them run inside one transaction.
        let rows_per_statement = (self.max_bind_params() / schema.columns.len()).max(1);

        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut tx = pool.begin().await.context("Failed to begin transaction")?;
                for (chunk_idx, chunk) in batch.rows.chunks(rows_per_statement).enumerate() {
                    let first_row = batch.first_row + (chunk_idx * rows_per_statement) as u64;
                    let values = coerce_rows(schema, chunk, first_row)?;
                    let sql = generate_insert(table_name, schema, values.len());

                    let mut query = sqlx::query(&sql);
                    for row in &values {
                        for (value, column) in row.iter().zip(&schema.columns) {
                            query = bind_pg(query, value, column.sql_type);
                        }
                    }

                    with_timeout(query.execute(&mut *tx))
                        .await
                        .context("Failed to execute batch insert")?;
                }
                tx.commit().await.context("Failed to commit batch")?;
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let mut tx = pool.begin().await.context("Failed to begin transaction")?;
                for (chunk_idx, chunk) in batch.rows.chunks(rows_per_statement).enumerate() {
                    let first_row = batch.first_row + (chunk_idx * rows_per_statement) as u64;
                    let values = coerce_rows(schema, chunk, first_row)?;
                    let sql = convert_to_sqlite_placeholders(&generate_insert(
                        table_name,
                        schema,
                        values.len(),
                    ));

                    let mut query = sqlx::query(&sql);
                    for row in &values {
                        for (value, column) in row.iter().zip(&schema.columns) {
                            query = bind_sqlite(query, value, column.sql_type);
                        }
                    }

                    with_timeout(query.execute(&mut *tx))
                        .await
                        .context("Failed to execute batch insert")?;
                }
                tx.commit().await.context("Failed to commit batch")?;
            }
        }

        Ok(batch.len() as u64)
    }
}

/// Bound a query by the query timeout
async fn with_timeout<T>(fut: impl Future<Output = Result<T, sqlx::Error>>) -> Result<T> {
    tokio::time::timeout(QUERY_TIMEOUT, fut)
        .await
        .map_err(|_| {
            anyhow!(
                "Query execution timed out after {} seconds",
                QUERY_TIMEOUT.as_secs()
            )
        })?
        .map_err(anyhow::Error::from)
}

/// Coerce rows into the value representation of their column types
fn coerce_rows(schema: &Schema, rows: &[Vec<Value>], first_row: u64) -> Result<Vec<Vec<Value>>> {
    rows.iter()
        .enumerate()
        .map(|(offset, row)| {
            row.iter()
                .zip(&schema.columns)
                .map(|(value, column)| {
                    coerce_value(value, column.sql_type).with_context(|| {
                        format!(
                            "Invalid value in column '{}' at data row {}",
                            column.name,
                            first_row + offset as u64 + 1
                        )
                    })
                })
                .collect()
        })
        .collect()
}

/// Bind one value to a Postgres query, using a typed NULL for missing values
fn bind_pg<'q>(
    query: Query<'q, sqlx::Postgres, PgArguments>,
    value: &'q Value,
    sql_type: SqlType,
) -> Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        Value::Null => match sql_type {
            SqlType::Boolean => query.bind(None::<bool>),
            SqlType::BigInt => query.bind(None::<i64>),
            SqlType::DoublePrecision => query.bind(None::<f64>),
            SqlType::Text => query.bind(None::<String>),
            SqlType::Timestamp => query.bind(None::<NaiveDateTime>),
        },
        Value::Text(s) => query.bind(s.as_str()),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Bool(v) => query.bind(*v),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}

#[cfg(test)]
fn bind_sqlite<'q>(
    query: Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q Value,
    sql_type: SqlType,
) -> Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        Value::Null => match sql_type {
            SqlType::Boolean => query.bind(None::<bool>),
            SqlType::BigInt => query.bind(None::<i64>),
            SqlType::DoublePrecision => query.bind(None::<f64>),
            SqlType::Text => query.bind(None::<String>),
            SqlType::Timestamp => query.bind(None::<NaiveDateTime>),
        },
        Value::Text(s) => query.bind(s.as_str()),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Bool(v) => query.bind(*v),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}

/// Convert Postgres-style placeholders ($1, $2, ...) to SQLite-style (?, ?, ...)
#[cfg(test)]
fn convert_to_sqlite_placeholders(sql: &str) -> String {
    let mut result = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            // Skip the dollar sign and any following digits
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                chars.next();
            }
            result.push('?');
        } else {
            result.push(ch);
        }
    }

    result
}
