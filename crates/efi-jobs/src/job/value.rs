//! Typed field values and their SQL / JSON conversions.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSqlError, ToSql, ToSqlOutput, Value, ValueRef};
use serde_json::Value as JsonValue;

use super::Status;

/// Storage kind of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
    Time,
    Status,
}

/// Value of one job field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Time(DateTime<Utc>),
    Status(Status),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Whether this value may be stored in a field of `kind`. Null fits any kind.
    pub fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Null, _)
                | (FieldValue::Int(_), FieldKind::Int)
                | (FieldValue::Int(_), FieldKind::Float)
                | (FieldValue::Float(_), FieldKind::Float)
                | (FieldValue::Bool(_), FieldKind::Bool)
                | (FieldValue::Text(_), FieldKind::Text)
                | (FieldValue::Time(_), FieldKind::Time)
                | (FieldValue::Status(_), FieldKind::Status)
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<Status> {
        match self {
            FieldValue::Status(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// JSON representation used in parameter files.
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Int(v) => JsonValue::from(*v),
            FieldValue::Float(v) => JsonValue::from(*v),
            FieldValue::Bool(v) => JsonValue::Bool(*v),
            FieldValue::Text(v) => JsonValue::String(v.clone()),
            FieldValue::Time(v) => JsonValue::String(v.to_rfc3339()),
            FieldValue::Status(v) => JsonValue::String(v.to_string()),
        }
    }

    /// Converts a JSON value into a field of `kind`. Returns `None` when the
    /// value cannot represent that kind.
    pub fn from_json(kind: FieldKind, value: &JsonValue) -> Option<FieldValue> {
        if value.is_null() {
            return Some(FieldValue::Null);
        }
        match kind {
            FieldKind::Int => value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .map(FieldValue::Int),
            FieldKind::Float => value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .map(FieldValue::Float),
            FieldKind::Bool => value.as_bool().map(FieldValue::Bool),
            FieldKind::Text => match value {
                JsonValue::String(s) => Some(FieldValue::Text(s.clone())),
                JsonValue::Number(n) => Some(FieldValue::Text(n.to_string())),
                _ => None,
            },
            FieldKind::Time => value.as_str().and_then(parse_time).map(FieldValue::Time),
            FieldKind::Status => value
                .as_str()
                .and_then(|s| s.parse::<Status>().ok())
                .map(FieldValue::Status),
        }
    }

    /// Converts a JSON value without a declared kind.
    pub fn from_json_untyped(value: &JsonValue) -> FieldValue {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }

    /// Decodes a column value of the given kind.
    pub fn from_sql(kind: FieldKind, value: ValueRef<'_>) -> Result<FieldValue, FromSqlError> {
        if let ValueRef::Null = value {
            return Ok(FieldValue::Null);
        }
        let decoded = match kind {
            FieldKind::Int => FieldValue::Int(value.as_i64()?),
            FieldKind::Float => match value {
                ValueRef::Integer(i) => FieldValue::Float(i as f64),
                other => FieldValue::Float(other.as_f64()?),
            },
            FieldKind::Bool => match value {
                ValueRef::Integer(i) => FieldValue::Bool(i != 0),
                ValueRef::Text(t) => FieldValue::Bool(matches!(t, b"1" | b"true" | b"TRUE")),
                _ => return Err(FromSqlError::InvalidType),
            },
            FieldKind::Text => match value {
                ValueRef::Text(_) => FieldValue::Text(value.as_str()?.to_string()),
                ValueRef::Integer(i) => FieldValue::Text(i.to_string()),
                ValueRef::Real(r) => FieldValue::Text(r.to_string()),
                _ => return Err(FromSqlError::InvalidType),
            },
            FieldKind::Time => {
                let text = value.as_str()?;
                let time = parse_time(text).ok_or_else(|| {
                    FromSqlError::Other(format!("invalid timestamp '{}'", text).into())
                })?;
                FieldValue::Time(time)
            }
            FieldKind::Status => {
                let text = value.as_str()?;
                let status = text
                    .parse::<Status>()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))?;
                FieldValue::Status(status)
            }
        };
        Ok(decoded)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Time(v) => f.write_str(&v.to_rfc3339()),
            FieldValue::Status(v) => write!(f, "{}", v),
        }
    }
}

impl From<Status> for FieldValue {
    fn from(status: Status) -> Self {
        FieldValue::Status(status)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            FieldValue::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            FieldValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            FieldValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            FieldValue::Time(v) => ToSqlOutput::Owned(Value::Text(v.to_rfc3339())),
            FieldValue::Status(v) => return v.to_sql(),
        };
        Ok(out)
    }
}

/// Parses RFC 3339 timestamps, falling back to the naive
/// `YYYY-MM-DD HH:MM:SS[.f]` form written by the web front end (read as UTC).
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
