use anyhow::Result;
use std::sync::Arc;

use super::value::Value;

/// A bounded, ordered group of rows read from the source file
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Zero-based position of this batch in the file
    pub batch_index: usize,
    /// Zero-based index of the first data row of this batch in the file
    pub first_row: u64,
    /// Field names from the header, shared by every batch of a file
    pub columns: Arc<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column in the header
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// A finite, forward-only sequence of record batches that can be restarted
/// from the first data row.
///
/// `next_batch` returns `Ok(None)` once the source is exhausted; every call
/// after that keeps returning `Ok(None)` until `rewind` is called.
pub trait BatchSource {
    /// Field names from the header row
    fn columns(&self) -> &Arc<Vec<String>>;

    /// Read the next batch of at most `batch_size` rows
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    /// Restart the sequence from the first data row
    fn rewind(&mut self) -> Result<()>;
}

/// Compression wrapper around the CSV payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

    /// Detect the compression from the leading bytes of the file
    pub fn detect(prefix: &[u8]) -> Self {
        if prefix.starts_with(&Self::GZIP_MAGIC) {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// Configuration for delimited file reading
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_compression() {
        assert_eq!(Compression::detect(&[0x1f, 0x8b, 0x08]), Compression::Gzip);
        assert_eq!(Compression::detect(b"VendorID,"), Compression::None);
        assert_eq!(Compression::detect(&[0x1f]), Compression::None);
        assert_eq!(Compression::detect(&[]), Compression::None);
    }

    #[test]
    fn test_column_index() {
        let batch = RecordBatch {
            batch_index: 0,
            first_row: 0,
            columns: Arc::new(vec!["VendorID".to_string(), "fare".to_string()]),
            rows: vec![],
        };
        assert_eq!(batch.column_index("fare"), Some(1));
        assert_eq!(batch.column_index("missing"), None);
        assert!(batch.is_empty());
    }
}
