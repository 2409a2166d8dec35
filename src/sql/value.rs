//! The coercible value type shared by result rows, parameter bindings, and
//! the upstream session's point values.
//!
//! §4.6 specifies that numeric columns accept a number or a parseable
//! string, booleans accept `Boolean` or the string forms
//! `{"1","true","yes","on"}` (case-insensitive), date/time columns accept a
//! native timestamp or an ISO-like string, and UUID columns accept a UUID
//! value, a syntactically valid UUID string, or a 16-byte array. `Value` is
//! the one representation all of those coercions target.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::sql::error::{Result, SqlError};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self, column: &str) -> Result<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::Integer(n) => Ok(Some(*n)),
            Value::Float(f) => Ok(Some(*f as i64)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| SqlError::WrongDataType(column.to_string())),
            _ => Err(SqlError::WrongDataType(column.to_string())),
        }
    }

    pub fn as_f64(&self, column: &str) -> Result<Option<f64>> {
        match self {
            Value::Null => Ok(None),
            Value::Integer(n) => Ok(Some(*n as f64)),
            Value::Float(f) => Ok(Some(*f)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| SqlError::WrongDataType(column.to_string())),
            _ => Err(SqlError::WrongDataType(column.to_string())),
        }
    }

    pub fn as_bool(&self, column: &str) -> Result<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Integer(n) => Ok(Some(*n != 0)),
            Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(SqlError::WrongDataType(column.to_string())),
            },
            _ => Err(SqlError::WrongDataType(column.to_string())),
        }
    }

    pub fn as_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        match self {
            Value::Null => Ok(None),
            Value::Timestamp(t) => Ok(Some(*t)),
            Value::Text(s) => s
                .parse::<DateTime<Utc>>()
                .map(Some)
                .map_err(|_| SqlError::NotAStamp(s.clone())),
            _ => Err(SqlError::WrongDataType(column.to_string())),
        }
    }

    pub fn as_uuid(&self, column: &str) -> Result<Option<Uuid>> {
        match self {
            Value::Null => Ok(None),
            Value::Uuid(u) => Ok(Some(*u)),
            Value::Text(s) => Uuid::parse_str(s)
                .map(Some)
                .map_err(|_| SqlError::NotAUuid(s.clone())),
            _ => Err(SqlError::WrongDataType(column.to_string())),
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Timestamp(t) => Some(t.to_rfc3339()),
            Value::Uuid(u) => Some(u.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_coercion_accepts_string_forms_case_insensitively() {
        assert_eq!(Value::Text("YES".into()).as_bool("x").unwrap(), Some(true));
        assert_eq!(Value::Text("Off".into()).as_bool("x").unwrap(), Some(false));
        assert!(Value::Text("maybe".into()).as_bool("x").is_err());
    }

    #[test]
    fn numeric_coercion_accepts_parseable_strings() {
        assert_eq!(Value::Text(" 42 ".into()).as_i64("x").unwrap(), Some(42));
        assert_eq!(Value::Text("3.5".into()).as_f64("x").unwrap(), Some(3.5));
    }

    #[test]
    fn uuid_coercion_accepts_string_form() {
        let u = Uuid::new_v4();
        let v = Value::Text(u.to_string());
        assert_eq!(v.as_uuid("x").unwrap(), Some(u));
    }

    #[test]
    fn null_coerces_to_none_everywhere() {
        assert_eq!(Value::Null.as_i64("x").unwrap(), None);
        assert_eq!(Value::Null.as_bool("x").unwrap(), None);
        assert_eq!(Value::Null.as_uuid("x").unwrap(), None);
    }
}
