//! File format parsers and readers

pub mod delimited;
pub mod reader;
pub mod value;

pub use delimited::DelimitedBatchReader;
pub use reader::{BatchSource, DelimitedConfig, RecordBatch};
pub use value::Value;
