use crate::error::{AuditError, AuditResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One result row, keyed by column name.
pub type SqlRow = BTreeMap<String, SqlValue>;

/// A literal value in a statement or a cell in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Text.
    Text(String),
    /// GUID.
    Uuid(Uuid),
    /// Timestamp.
    Timestamp(DateTime<Utc>),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Returns `true` for `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) fn as_i64(&self, column: &'static str) -> AuditResult<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Bool(v) => Ok(i64::from(*v)),
            Self::Text(v) => v
                .parse()
                .map_err(|_| AuditError::column(column, format!("'{v}' is not an integer"))),
            other => Err(AuditError::column(column, format!("expected an integer, got {other:?}"))),
        }
    }

    pub(crate) fn as_text(&self, column: &'static str) -> AuditResult<Option<String>> {
        match self {
            Self::Null => Ok(None),
            Self::Text(v) => Ok(Some(v.clone())),
            Self::Uuid(v) => Ok(Some(v.to_string())),
            other => Err(AuditError::column(column, format!("expected text, got {other:?}"))),
        }
    }

    pub(crate) fn as_bytes(&self, column: &'static str) -> AuditResult<Option<Vec<u8>>> {
        match self {
            Self::Null => Ok(None),
            Self::Bytes(v) => Ok(Some(v.clone())),
            Self::Text(v) => Ok(Some(v.clone().into_bytes())),
            other => Err(AuditError::column(column, format!("expected bytes, got {other:?}"))),
        }
    }

    pub(crate) fn as_uuid(&self, column: &'static str) -> AuditResult<Uuid> {
        match self {
            Self::Uuid(v) => Ok(*v),
            Self::Text(v) => Uuid::parse_str(v)
                .map_err(|e| AuditError::column(column, format!("'{v}' is not a GUID: {e}"))),
            Self::Bytes(v) => Uuid::from_slice(v)
                .map_err(|e| AuditError::column(column, format!("not a GUID: {e}"))),
            other => Err(AuditError::column(column, format!("expected a GUID, got {other:?}"))),
        }
    }

    pub(crate) fn as_timestamp(&self, column: &'static str) -> AuditResult<DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => Ok(*v),
            Self::Text(v) => parse_timestamp(v)
                .ok_or_else(|| AuditError::column(column, format!("'{v}' is not a timestamp"))),
            other => Err(AuditError::column(column, format!("expected a timestamp, got {other:?}"))),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
        for text in ["2024-03-09T08:07:06Z", "2024-03-09 08:07:06", "2024-03-09 08:07:06.000000"] {
            assert_eq!(SqlValue::from(text).as_timestamp("CreatedAt").unwrap(), expected);
        }
        assert!(SqlValue::from("yesterday").as_timestamp("CreatedAt").is_err());
    }

    #[test]
    fn test_integer_from_text() {
        assert_eq!(SqlValue::from("3").as_i64("Status").unwrap(), 3);
        assert!(SqlValue::Null.as_i64("Status").is_err());
    }

    #[test]
    fn test_option_maps_to_null() {
        assert!(SqlValue::from(None::<String>).is_null());
        assert_eq!(SqlValue::from(Some(4_i64)), SqlValue::Int(4));
    }
}
