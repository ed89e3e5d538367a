//! Database layer - connection pooling, table sink, and schema derivation

pub mod pool;
pub mod schema;
pub mod sink;

pub use pool::{Pool, PoolArgs, PoolArgsBuilder};
pub use schema::{Column, Schema, SchemaInferrer, SqlType};
pub use sink::TableSink;
