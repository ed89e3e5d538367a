pub mod reader;

pub use reader::DelimitedBatchReader;
