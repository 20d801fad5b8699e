//! Shapes raw service rows into their stream schema.
//!
//! A [`RecordShaper`] is built once per stream. It holds one accessor per
//! output column, so shaping a row is a single pass over that list with no
//! per-row schema lookups.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::discover::{FieldOptions, StreamDescriptor};
use crate::error::{ExtractError, Result};
use crate::source::Record;
use crate::typemap::{JsonFormat, JsonType};

/// How one output column is read from a raw row.
#[derive(Debug, Clone)]
enum Accessor {
    /// Copy the field of the same name, coerced to the column type.
    Field {
        name: String,
        json_type: JsonType,
        format: Option<JsonFormat>,
    },
    /// Resolve the code of `source` to its pick list label.
    Label {
        name: String,
        source: String,
        options: FieldOptions,
    },
}

/// Pre-resolved column accessors for one stream.
#[derive(Debug, Clone)]
pub struct RecordShaper {
    stream: String,
    accessors: Vec<Accessor>,
}

impl RecordShaper {
    pub fn new(descriptor: &StreamDescriptor) -> Self {
        let accessors = descriptor
            .schema
            .columns()
            .iter()
            .map(|column| match &column.label_of {
                Some(source) => Accessor::Label {
                    name: column.name.clone(),
                    source: source.clone(),
                    options: descriptor
                        .option_sets
                        .get(source)
                        .cloned()
                        .unwrap_or_default(),
                },
                None => Accessor::Field {
                    name: column.name.clone(),
                    json_type: column.json_type,
                    format: column.format,
                },
            })
            .collect();

        Self {
            stream: descriptor.id.clone(),
            accessors,
        }
    }

    /// Build the schema-shaped record.
    ///
    /// Every column is present in the output; fields missing from the row
    /// become null and fields outside the schema are dropped.
    pub fn shape(&self, raw: &Record) -> Result<Record> {
        let mut record = Record::new();
        for accessor in &self.accessors {
            let (name, value) = match accessor {
                Accessor::Field {
                    name,
                    json_type,
                    format,
                } => {
                    let value = raw.get(name).unwrap_or(&Value::Null);
                    let coerced = coerce(value, *json_type, *format).map_err(|message| {
                        ExtractError::invalid_record(&self.stream, format!("{}: {}", name, message))
                    })?;
                    (name, coerced)
                }
                Accessor::Label {
                    name,
                    source,
                    options,
                } => {
                    // The raw column precedes its label, so read the coerced code.
                    let code = record.get(source).or_else(|| raw.get(source));
                    (name, label_for(code, options))
                }
            };
            record.insert(name.clone(), value);
        }
        Ok(record)
    }

    pub fn column_count(&self) -> usize {
        self.accessors.len()
    }
}

/// Modification timestamp of a raw row, if present and parseable.
pub fn record_timestamp(raw: &Record, field: &str) -> Option<DateTime<Utc>> {
    raw.get(field).and_then(Value::as_str).and_then(parse_timestamp)
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// `Edm.Date` values carry no time component.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn label_for(code: Option<&Value>, options: &FieldOptions) -> Value {
    let code = match code {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    code.and_then(|c| options.get(&c))
        .map(|label| Value::String(label.clone()))
        .unwrap_or(Value::Null)
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn fits_i64(f: f64) -> bool {
    f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn coerce(
    value: &Value,
    json_type: JsonType,
    format: Option<JsonFormat>,
) -> std::result::Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match (json_type, format) {
        (JsonType::String, Some(JsonFormat::DateTime)) => match value {
            Value::String(s) => parse_timestamp(s)
                .or_else(|| parse_date(s))
                .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .ok_or_else(|| format!("'{}' is not a date-time", s)),
            other => Err(format!("expected date-time string, got {}", other)),
        },
        (JsonType::String, None) => Ok(match value {
            Value::String(_) => value.clone(),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => Value::String(other.to_string()),
        }),
        (JsonType::Integer, _) => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && fits_i64(*f))
                .map(|f| Value::Number(Number::from(f as i64)))
                .ok_or_else(|| format!("{} is not an integer", n)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Value::Number(Number::from(i)))
                .map_err(|_| format!("'{}' is not an integer", s)),
            other => Err(format!("expected integer, got {}", other)),
        },
        (JsonType::Number, _) => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", s)),
            other => Err(format!("expected number, got {}", other)),
        },
        (JsonType::Boolean, _) => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(format!("expected boolean, got {}", other)),
        },
    }
}
