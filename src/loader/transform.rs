//! Declarative per-column transforms applied to every batch
//!
//! A [`ColumnTransforms`] table maps field names to a [`ColumnTransform`];
//! fields that are not listed pass through untouched. Transforms are pure:
//! they consume a batch and return the transformed batch, and applying the
//! same table twice gives the same result as applying it once.

use std::fmt;
use thiserror::Error;

use crate::db::schema::SqlType;
use crate::formats::value::{Value, parse_integer, parse_timestamp};
use crate::formats::RecordBatch;

/// Coercion applied to a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTransform {
    /// Parse text into a timestamp; nulls stay null
    Timestamp,
    /// Coerce into a nullable 64-bit integer; blanks become null
    NullableInt,
}

impl ColumnTransform {
    /// Destination column type produced by this transform
    pub fn sql_type(&self) -> SqlType {
        match self {
            ColumnTransform::Timestamp => SqlType::Timestamp,
            ColumnTransform::NullableInt => SqlType::BigInt,
        }
    }

    /// Apply the transform to one value. Returns `None` if the value
    /// cannot be coerced.
    pub fn apply(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),

            (ColumnTransform::Timestamp, Value::Timestamp(ts)) => Some(Value::Timestamp(*ts)),
            (ColumnTransform::Timestamp, Value::Text(s)) => parse_timestamp(s).map(Value::Timestamp),

            (ColumnTransform::NullableInt, Value::Int(v)) => Some(Value::Int(*v)),
            (ColumnTransform::NullableInt, Value::Text(s)) if s.trim().is_empty() => {
                Some(Value::Null)
            }
            (ColumnTransform::NullableInt, Value::Text(s)) => parse_integer(s).map(Value::Int),
            (ColumnTransform::NullableInt, Value::Float(v)) if v.fract() == 0.0 => {
                Some(Value::Int(*v as i64))
            }

            _ => None,
        }
    }
}

impl fmt::Display for ColumnTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnTransform::Timestamp => f.write_str("timestamp"),
            ColumnTransform::NullableInt => f.write_str("nullable integer"),
        }
    }
}

/// Why a batch could not be transformed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformFailure {
    /// A column with a transform is not present in the batch header
    #[error("column '{column}' is not present in the source header")]
    MissingColumn { column: String },
    /// A value could not be coerced
    #[error("cannot convert '{value}' in column '{column}' at data row {row} to {transform}")]
    InvalidValue {
        column: String,
        /// One-based data row within the file
        row: u64,
        value: String,
        transform: ColumnTransform,
    },
}

/// Table of column transforms, keyed by field name
#[derive(Debug, Clone, Default)]
pub struct ColumnTransforms {
    transforms: Vec<(String, ColumnTransform)>,
}

impl ColumnTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transforms for yellow taxi trip records
    pub fn nyc_taxi() -> Self {
        Self::new()
            .with("tpep_pickup_datetime", ColumnTransform::Timestamp)
            .with("tpep_dropoff_datetime", ColumnTransform::Timestamp)
            .with("VendorID", ColumnTransform::NullableInt)
    }

    /// Add or replace the transform for a column
    pub fn with(mut self, column: impl Into<String>, transform: ColumnTransform) -> Self {
        let column = column.into();
        self.transforms.retain(|(name, _)| *name != column);
        self.transforms.push((column, transform));
        self
    }

    pub fn get(&self, column: &str) -> Option<ColumnTransform> {
        self.transforms
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, transform)| *transform)
    }

    /// Apply every transform to a batch. Columns without a transform are
    /// left as they are.
    pub fn apply(&self, mut batch: RecordBatch) -> Result<RecordBatch, TransformFailure> {
        let mut resolved = Vec::with_capacity(self.transforms.len());
        for (column, transform) in &self.transforms {
            let col_idx = batch
                .column_index(column)
                .ok_or_else(|| TransformFailure::MissingColumn {
                    column: column.clone(),
                })?;
            resolved.push((col_idx, column, *transform));
        }

        for (row_offset, row) in batch.rows.iter_mut().enumerate() {
            for (col_idx, column, transform) in &resolved {
                let Some(cell) = row.get_mut(*col_idx) else {
                    continue;
                };
                let Some(value) = transform.apply(cell) else {
                    return Err(TransformFailure::InvalidValue {
                        column: column.to_string(),
                        row: batch.first_row + row_offset as u64 + 1,
                        value: cell.to_string(),
                        transform: *transform,
                    });
                };
                *cell = value;
            }
        }

        Ok(batch)
    }
}
