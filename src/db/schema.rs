use anyhow::{Result, anyhow};

use crate::formats::value::{Value, parse_bool, parse_integer, parse_timestamp};
use crate::formats::RecordBatch;
use crate::loader::ColumnTransforms;

/// SQL data type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    BigInt,
    DoublePrecision,
    Text,
    Timestamp,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::BigInt => "BIGINT",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }

    /// Find the most specific common type that accommodates both types
    pub fn common_type(&self, other: &SqlType) -> SqlType {
        use SqlType::*;
        match (self, other) {
            (a, b) if a == b => *a,
            (BigInt, DoublePrecision) | (DoublePrecision, BigInt) => DoublePrecision,
            _ => Text,
        }
    }
}

/// A column in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

/// Column layout of a destination table, in header order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Derives a table schema from the schema-defining batch
pub struct SchemaInferrer;

impl SchemaInferrer {
    /// Infer the type of a single value; `None` for nulls
    fn infer_value_type(value: &Value) -> Option<SqlType> {
        match value {
            Value::Null => None,
            Value::Int(_) => Some(SqlType::BigInt),
            Value::Float(_) => Some(SqlType::DoublePrecision),
            Value::Bool(_) => Some(SqlType::Boolean),
            Value::Timestamp(_) => Some(SqlType::Timestamp),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.parse::<i64>().is_ok() {
                    Some(SqlType::BigInt)
                } else if trimmed.parse::<f64>().is_ok() {
                    Some(SqlType::DoublePrecision)
                } else if parse_bool(trimmed).is_some() {
                    Some(SqlType::Boolean)
                } else {
                    Some(SqlType::Text)
                }
            }
        }
    }

    /// Infer a column type from all of its values; all-null columns are TEXT
    fn infer_column_type<'a>(values: impl Iterator<Item = &'a Value>) -> SqlType {
        values
            .filter_map(Self::infer_value_type)
            .reduce(|current, next| current.common_type(&next))
            .unwrap_or(SqlType::Text)
    }

    /// Build the schema of a transformed batch.
    ///
    /// Columns with a transform take the transform's type; all other columns
    /// are inferred from the batch's values.
    pub fn infer_from_batch(batch: &RecordBatch, transforms: &ColumnTransforms) -> Schema {
        let columns = batch
            .columns
            .iter()
            .enumerate()
            .map(|(col_idx, name)| {
                let sql_type = match transforms.get(name) {
                    Some(transform) => transform.sql_type(),
                    None => Self::infer_column_type(
                        batch.rows.iter().filter_map(|row| row.get(col_idx)),
                    ),
                };
                Column {
                    name: name.clone(),
                    sql_type,
                }
            })
            .collect();

        Schema { columns }
    }
}

/// Quote an identifier, doubling any embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate the DDL statements that drop and recreate a table
pub fn generate_replace_ddl(table_name: &str, schema: &Schema) -> [String; 2] {
    let table = quote_ident(table_name);
    let column_defs: Vec<String> = schema
        .columns
        .iter()
        .map(|col| format!("  {} {}", quote_ident(&col.name), col.sql_type.to_postgres()))
        .collect();

    [
        format!("DROP TABLE IF EXISTS {}", table),
        format!("CREATE TABLE {} (\n{}\n)", table, column_defs.join(",\n")),
    ]
}

/// Generate a multi-row INSERT with Postgres-style placeholders
pub fn generate_insert(table_name: &str, schema: &Schema, row_count: usize) -> String {
    let num_columns = schema.columns.len();
    let column_list: Vec<String> = schema.columns.iter().map(|c| quote_ident(&c.name)).collect();

    let mut param_idx = 1;
    let value_groups: Vec<String> = (0..row_count)
        .map(|_| {
            let placeholders: Vec<String> = (0..num_columns)
                .map(|_| {
                    let placeholder = format!("${}", param_idx);
                    param_idx += 1;
                    placeholder
                })
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table_name),
        column_list.join(", "),
        value_groups.join(", ")
    )
}

/// Coerce a batch value into the representation bound for its column type
pub fn coerce_value(value: &Value, sql_type: SqlType) -> Result<Value> {
    let mismatch = || {
        anyhow!(
            "Type mismatch: cannot convert '{}' to {}",
            value,
            sql_type.to_postgres()
        )
    };

    Ok(match (value, sql_type) {
        (Value::Null, _) => Value::Null,

        (Value::Text(s), SqlType::Text) => Value::Text(s.clone()),
        (Value::Text(s), SqlType::BigInt) => Value::Int(parse_integer(s).ok_or_else(mismatch)?),
        (Value::Text(s), SqlType::DoublePrecision) => {
            Value::Float(s.trim().parse::<f64>().map_err(|_| mismatch())?)
        }
        (Value::Text(s), SqlType::Boolean) => Value::Bool(parse_bool(s).ok_or_else(mismatch)?),
        (Value::Text(s), SqlType::Timestamp) => {
            Value::Timestamp(parse_timestamp(s).ok_or_else(mismatch)?)
        }

        (Value::Int(v), SqlType::BigInt) => Value::Int(*v),
        (Value::Int(v), SqlType::DoublePrecision) => Value::Float(*v as f64),
        (Value::Float(v), SqlType::DoublePrecision) => Value::Float(*v),
        (Value::Bool(v), SqlType::Boolean) => Value::Bool(*v),
        (Value::Timestamp(ts), SqlType::Timestamp) => Value::Timestamp(*ts),

        (other, SqlType::Text) => Value::Text(other.to_string()),
        _ => return Err(mismatch()),
    })
}
