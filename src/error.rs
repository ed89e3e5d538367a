use std::path::PathBuf;
use thiserror::Error;

use crate::loader::TransformFailure;

/// Describe how much of a run is durable in the destination table
fn progress(rows_committed: &u64) -> String {
    if *rows_committed == 0 {
        "nothing was loaded".to_string()
    } else {
        format!("partially loaded, {} rows committed", rows_committed)
    }
}

/// Fatal conditions of an ingest run.
///
/// Every variant aborts the run. Batches appended before the failure stay
/// committed; `rows_committed` tells how many rows that is.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to fetch {url}: nothing was loaded")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to connect to the database: nothing was loaded")]
    Connect(#[source] anyhow::Error),

    #[error("Failed to open source file {}: nothing was loaded", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Source contains no data rows: nothing was loaded")]
    EmptySource,

    #[error("Failed to read batch {batch_number}, {}", progress(.rows_committed))]
    Read {
        batch_number: usize,
        rows_committed: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to transform batch {batch_number}, {}", progress(.rows_committed))]
    Transform {
        batch_number: usize,
        rows_committed: u64,
        #[source]
        source: TransformFailure,
    },

    #[error("Failed to create table '{table}': nothing was loaded")]
    CreateTable {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to append batch {batch_number}, {}", progress(.rows_committed))]
    Append {
        batch_number: usize,
        rows_committed: u64,
        #[source]
        source: anyhow::Error,
    },
}

impl LoadError {
    /// Rows durable in the destination table when the run stopped
    pub fn rows_committed(&self) -> u64 {
        match self {
            LoadError::Read { rows_committed, .. }
            | LoadError::Transform { rows_committed, .. }
            | LoadError::Append { rows_committed, .. } => *rows_committed,
            _ => 0,
        }
    }

    /// Batch at which the run stopped, if it got as far as reading batches
    pub fn batch_number(&self) -> Option<usize> {
        match self {
            LoadError::Read { batch_number, .. }
            | LoadError::Transform { batch_number, .. }
            | LoadError::Append { batch_number, .. } => Some(*batch_number),
            _ => None,
        }
    }

    /// True if some rows were committed before the failure
    pub fn is_partial(&self) -> bool {
        self.rows_committed() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_distinguish_partial_loads() {
        let nothing = LoadError::Append {
            batch_number: 1,
            rows_committed: 0,
            source: anyhow::anyhow!("connection reset"),
        };
        assert_eq!(
            nothing.to_string(),
            "Failed to append batch 1, nothing was loaded"
        );
        assert!(!nothing.is_partial());

        let partial = LoadError::Transform {
            batch_number: 3,
            rows_committed: 200_000,
            source: TransformFailure::MissingColumn {
                column: "VendorID".to_string(),
            },
        };
        assert_eq!(
            partial.to_string(),
            "Failed to transform batch 3, partially loaded, 200000 rows committed"
        );
        assert!(partial.is_partial());
        assert_eq!(partial.batch_number(), Some(3));
    }

    #[test]
    fn test_source_chain_is_kept() {
        let err = LoadError::Fetch {
            url: "https://example.com/data.csv.gz".to_string(),
            source: anyhow::anyhow!("HTTP status client error (404 Not Found)"),
        };
        let report = format!("{:#}", anyhow::Error::from(err));
        assert!(report.contains("404 Not Found"));
        assert_eq!(LoadError::EmptySource.batch_number(), None);
    }
}
