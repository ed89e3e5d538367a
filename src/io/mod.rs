//! Getting the source file onto local disk

pub mod fetch;
pub mod uri;

pub use fetch::Fetcher;
pub use uri::SourceUri;
