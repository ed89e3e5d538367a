use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;

/// A single cell of a record batch
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Build a value from a raw CSV field; empty fields are missing values
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() {
            Value::Null
        } else {
            Value::Text(field.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

/// Timestamp layouts accepted for datetime columns, tried in order
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",    // 2021-01-01 00:30:10
    "%Y-%m-%dT%H:%M:%S",    // 2021-01-01T00:30:10
    "%Y-%m-%d %H:%M:%S%.f", // with fractional seconds
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M", // without seconds
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p", // 01/01/2021 12:30:10 AM
    "%m/%d/%Y %I:%M %p",
];

/// Layouts carrying a UTC offset; parsed values are converted to UTC
const OFFSET_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z", // 2021-01-01 00:30:10+00:00
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%z", // 2021-01-01 00:30:10+0000
    "%Y-%m-%dT%H:%M:%S%z",
];

/// Layouts with a literal `Z` suffix
const UTC_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%SZ", "%Y-%m-%d %H:%M:%S%.fZ"];

/// Date-only layouts, read as midnight
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a timestamp in any of the supported layouts
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .chain(UTC_TIMESTAMP_FORMATS)
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            OFFSET_TIMESTAMP_FORMATS.iter().find_map(|format| {
                DateTime::parse_from_str(trimmed, format)
                    .ok()
                    .map(|dt| dt.naive_utc())
            })
        })
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(trimmed, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
}

/// Parse an integer, accepting float text with no fractional part ("2.0")
pub fn parse_integer(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }

    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Parse a boolean literal (true/false in any case)
pub fn parse_bool(value: &str) -> Option<bool> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_empty_field_is_null() {
        assert_eq!(Value::from_field(""), Value::Null);
        assert_eq!(Value::from_field(" "), Value::Text(" ".to_string()));
        assert_eq!(Value::from_field("N"), Value::Text("N".to_string()));
    }

    #[test]
    fn test_timestamp_parsing() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 10)
            .unwrap();

        let test_cases = [
            "2021-01-01 00:30:10",
            "2021-01-01T00:30:10",
            "2021-01-01 00:30:10.000",
            "01/01/2021 00:30:10",
            "01/01/2021 12:30:10 AM",
            " 2021-01-01 00:30:10 ",
        ];

        for input in test_cases {
            assert_eq!(parse_timestamp(input), Some(expected), "input '{}'", input);
        }

        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("2021-02-30 00:00:00"), None);
        assert_eq!(parse_timestamp("2021-02-30"), None);
    }

    #[test]
    fn test_offset_timestamps_convert_to_utc() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 10)
            .unwrap();

        let test_cases = [
            "2021-01-01T00:30:10Z",
            "2021-01-01 00:30:10Z",
            "2021-01-01 00:30:10+00:00",
            "2021-01-01 00:30:10+0000",
            "2021-01-01T00:30:10.000+00:00",
            "2021-01-01T01:30:10+01:00",
            "2020-12-31 19:30:10-05:00",
        ];

        for input in test_cases {
            assert_eq!(parse_timestamp(input), Some(expected), "input '{}'", input);
        }
    }

    #[test]
    fn test_date_only_is_midnight() {
        let midnight = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        assert_eq!(parse_timestamp("2021-01-01"), Some(midnight));
        assert_eq!(parse_timestamp("01/01/2021"), Some(midnight));
    }

    #[test]
    fn test_integer_parsing() {
        assert_eq!(parse_integer("2"), Some(2));
        assert_eq!(parse_integer(" -7 "), Some(-7));
        assert_eq!(parse_integer("2.0"), Some(2));
        assert_eq!(parse_integer("2.5"), None);
        assert_eq!(parse_integer("NaN"), None);
        assert_eq!(parse_integer("abc"), None);
    }

    #[test]
    fn test_display_round_trips_text() {
        assert_eq!(Value::Text("abc".to_string()).to_string(), "abc");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Int(42).to_string(), "42");
    }
}
