//! Chunked streaming ingestion: batch reading, column transforms, appends

pub mod chunked;
pub mod transform;

pub use chunked::{ChunkedLoader, LoadSummary};
pub use transform::{ColumnTransforms, TransformFailure};
