//! Configuration constants for the ingest pipeline
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Source File Configuration
// ============================================================================

/// File the fetcher writes the downloaded dataset to
pub const OUTPUT_FILE_NAME: &str = "output.csv.gz";

/// Maximum number of rows held in memory at once
///
/// Each batch is read, transformed and appended before the next one is read,
/// so this bounds the resident row count of a run.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

// ============================================================================
// Fetch Configuration
// ============================================================================

pub const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Database Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Timeout for individual database statements
///
/// A batch is split into several INSERT statements; this bounds each of them,
/// not the batch as a whole.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(180); // 3 minutes

/// Postgres accepts at most 65535 bind parameters per statement
pub const POSTGRES_MAX_BIND_PARAMS: usize = 65_535;

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER (3.32+)
#[cfg(test)]
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;
