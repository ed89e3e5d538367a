use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DEFAULT_BATCH_SIZE;
use crate::formats::reader::{BatchSource, Compression, DelimitedConfig, RecordBatch};
use crate::formats::value::Value;

type CsvReader = csv::Reader<Box<dyn Read + Send>>;

/// Streaming reader that turns a (optionally gzip-compressed) delimited file
/// into fixed-size record batches.
///
/// Only one batch is materialized at a time; the rest of the file stays on disk.
pub struct DelimitedBatchReader {
    path: PathBuf,
    config: DelimitedConfig,
    batch_size: usize,
    columns: Arc<Vec<String>>,
    reader: CsvReader,
    next_row: u64,
    next_batch_index: usize,
    exhausted: bool,
}

impl DelimitedBatchReader {
    /// Open a file and read its header row
    pub fn open(
        path: impl AsRef<Path>,
        config: DelimitedConfig,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            anyhow::bail!("Batch size must be at least 1");
        }

        let path = path.as_ref().to_path_buf();
        let (reader, columns) = Self::open_reader(&path, &config)?;

        Ok(Self {
            path,
            config,
            batch_size,
            columns,
            reader,
            next_row: 0,
            next_batch_index: 0,
            exhausted: false,
        })
    }

    fn open_reader(path: &Path, config: &DelimitedConfig) -> Result<(CsvReader, Arc<Vec<String>>)> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open source file {}", path.display()))?;
        let mut file = BufReader::new(file);

        let compression = Compression::detect(
            file.fill_buf()
                .with_context(|| format!("Failed to read source file {}", path.display()))?,
        );

        let input: Box<dyn Read + Send> = match compression {
            Compression::Gzip => Box::new(MultiGzDecoder::new(file)),
            Compression::None => Box::new(file),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote)
            .has_headers(true)
            .from_reader(input);

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|s| s.to_string())
            .collect();

        tracing::debug!(
            path = %path.display(),
            ?compression,
            columns = columns.len(),
            "opened source file"
        );

        Ok((reader, Arc::new(columns)))
    }
}

impl BatchSource for DelimitedBatchReader {
    fn columns(&self) -> &Arc<Vec<String>> {
        &self.columns
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(self.batch_size.min(DEFAULT_BATCH_SIZE));
        let mut record = csv::StringRecord::new();

        while rows.len() < self.batch_size {
            let has_record = self.reader.read_record(&mut record).with_context(|| {
                format!(
                    "Failed to parse CSV record at data row {}",
                    self.next_row + rows.len() as u64 + 1
                )
            })?;

            if !has_record {
                self.exhausted = true;
                break;
            }

            rows.push(record.iter().map(Value::from_field).collect());
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let batch = RecordBatch {
            batch_index: self.next_batch_index,
            first_row: self.next_row,
            columns: Arc::clone(&self.columns),
            rows,
        };

        self.next_batch_index += 1;
        self.next_row += batch.len() as u64;

        Ok(Some(batch))
    }

    fn rewind(&mut self) -> Result<()> {
        let (reader, columns) = Self::open_reader(&self.path, &self.config)?;
        self.reader = reader;
        self.columns = columns;
        self.next_row = 0;
        self.next_batch_index = 0;
        self.exhausted = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_gz_csv(header: &str, num_rows: usize) -> NamedTempFile {
        let temp_file = NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(temp_file.reopen().unwrap(), GzLevel::fast());
        writeln!(encoder, "{}", header).unwrap();
        for i in 0..num_rows {
            writeln!(encoder, "{},row_{}", i, i).unwrap();
        }
        encoder.finish().unwrap();
        temp_file
    }

    fn drain(reader: &mut DelimitedBatchReader) -> Vec<RecordBatch> {
        let mut batches = Vec::new();
        while let Some(batch) = reader.next_batch().unwrap() {
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn test_batch_sizes_cover_all_rows() {
        // (rows, batch_size, expected batch lengths)
        let test_cases: [(usize, usize, &[usize]); 6] = [
            (10, 3, &[3, 3, 3, 1]),
            (9, 3, &[3, 3, 3]),
            (1, 1, &[1]),
            (5, 1, &[1, 1, 1, 1, 1]),
            (4, 100, &[4]),
            (0, 3, &[]),
        ];

        for (num_rows, batch_size, expected) in test_cases {
            let file = write_gz_csv("id,name", num_rows);
            let mut reader =
                DelimitedBatchReader::open(file.path(), DelimitedConfig::csv(), batch_size)
                    .unwrap();

            let lengths: Vec<usize> = drain(&mut reader).iter().map(|b| b.len()).collect();
            assert_eq!(
                lengths, expected,
                "rows={} batch_size={}",
                num_rows, batch_size
            );
        }
    }

    #[test]
    fn test_batches_track_position() {
        let file = write_gz_csv("id,name", 7);
        let mut reader = DelimitedBatchReader::open(file.path(), DelimitedConfig::csv(), 3).unwrap();

        let batches = drain(&mut reader);
        let positions: Vec<(usize, u64)> =
            batches.iter().map(|b| (b.batch_index, b.first_row)).collect();
        assert_eq!(positions, vec![(0, 0), (1, 3), (2, 6)]);
        assert_eq!(batches[2].rows[0][0], Value::Text("6".to_string()));
    }

    #[test]
    fn test_exhausted_reader_stays_exhausted() {
        let file = write_gz_csv("id,name", 2);
        let mut reader = DelimitedBatchReader::open(file.path(), DelimitedConfig::csv(), 5).unwrap();

        assert!(reader.next_batch().unwrap().is_some());
        assert!(reader.next_batch().unwrap().is_none());
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_rewind_restarts_from_first_row() {
        let file = write_gz_csv("id,name", 5);
        let mut reader = DelimitedBatchReader::open(file.path(), DelimitedConfig::csv(), 2).unwrap();

        let first_pass = drain(&mut reader);
        reader.rewind().unwrap();
        let second_pass = drain(&mut reader);

        assert_eq!(first_pass, second_pass);
        assert_eq!(second_pass[0].first_row, 0);
    }

    #[test]
    fn test_header_is_shared_by_batches() {
        let file = write_gz_csv("id,name", 4);
        let mut reader = DelimitedBatchReader::open(file.path(), DelimitedConfig::csv(), 2).unwrap();

        assert_eq!(reader.columns().as_slice(), ["id", "name"]);
        let batch = reader.next_batch().unwrap().unwrap();
        assert!(Arc::ptr_eq(&batch.columns, reader.columns()));
    }

    #[test]
    fn test_plain_csv_and_blank_fields() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "VendorID,store_and_fwd_flag").unwrap();
        writeln!(temp_file, ",N").unwrap();
        writeln!(temp_file, "2,").unwrap();
        temp_file.flush().unwrap();

        let mut reader =
            DelimitedBatchReader::open(temp_file.path(), DelimitedConfig::csv(), 10).unwrap();
        let batch = reader.next_batch().unwrap().unwrap();

        assert_eq!(
            batch.rows,
            vec![
                vec![Value::Null, Value::Text("N".to_string())],
                vec![Value::Text("2".to_string()), Value::Null],
            ]
        );
    }

    #[test]
    fn test_empty_file_yields_no_batches() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut reader =
            DelimitedBatchReader::open(temp_file.path(), DelimitedConfig::csv(), 10).unwrap();

        assert!(reader.columns().is_empty());
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "a,b").unwrap();
        writeln!(temp_file, "1,2").unwrap();
        writeln!(temp_file, "1,2,3").unwrap();
        temp_file.flush().unwrap();

        let mut reader =
            DelimitedBatchReader::open(temp_file.path(), DelimitedConfig::csv(), 10).unwrap();
        let err = reader.next_batch().unwrap_err();
        assert!(format!("{:#}", err).contains("data row 2"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let file = write_gz_csv("id,name", 1);
        assert!(DelimitedBatchReader::open(file.path(), DelimitedConfig::csv(), 0).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = DelimitedBatchReader::open("/nonexistent/output.csv.gz", DelimitedConfig::csv(), 1);
        assert!(result.is_err());
    }
}
