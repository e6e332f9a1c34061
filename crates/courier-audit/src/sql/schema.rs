use super::dialect::SqlDialect;
use super::value::{SqlRow, SqlValue};
use crate::error::{AuditError, AuditResult};
use crate::record::{decode_data, decode_error, encode_data, encode_error, MessageRecord};
use courier_core::{ContentSerializer, MessageKind, ProcessingStatus};
use std::time::Duration;

/// Table name used when none is configured.
pub const DEFAULT_TABLE: &str = "Messages";

/// Auto-increment key column that gives relational stores their natural order.
pub const SEQUENCE_COLUMN: &str = "Sequence";

/// Logical column types of the audit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Message id.
    Guid,
    /// Small enumeration (kind, status).
    Byte,
    /// 32-bit integer.
    Int,
    /// Short indexed text (type names).
    Name,
    /// Unbounded text.
    Text,
    /// Unbounded binary.
    Binary,
    /// Timestamp with sub-second precision.
    Timestamp,
}

/// The audit columns in storage order, with their type and nullability.
pub const COLUMNS: [(&str, ColumnType, bool); 11] = [
    ("Id", ColumnType::Guid, false),
    ("Type", ColumnType::Byte, false),
    ("ContentType", ColumnType::Name, false),
    ("Content", ColumnType::Binary, true),
    ("Data", ColumnType::Binary, true),
    ("CreatedAt", ColumnType::Timestamp, false),
    ("ExecutionDuration", ColumnType::Int, false),
    ("Status", ColumnType::Byte, false),
    ("ErrorType", ColumnType::Name, true),
    ("ErrorMessage", ColumnType::Text, true),
    ("ErrorDetails", ColumnType::Binary, true),
];

/// Renders the `CREATE TABLE` statement for the audit table.
#[must_use]
pub fn create_table_script(dialect: &dyn SqlDialect, table: &str) -> String {
    let mut lines = vec![format!("    {}", dialect.sequence_column(SEQUENCE_COLUMN))];
    lines.extend(COLUMNS.iter().map(|(name, column_type, nullable)| {
        format!(
            "    {} {} {}",
            dialect.quote(name),
            dialect.column_type(*column_type),
            if *nullable { "NULL" } else { "NOT NULL" }
        )
    }));
    format!("CREATE TABLE {} (\n{}\n)", dialect.quote(table), lines.join(",\n"))
}

/// Projects a record into column values, in [`COLUMNS`] order.
///
/// # Errors
///
/// Returns `AuditError::Serialization` if the data or error details cannot be encoded.
pub fn record_values(
    record: &MessageRecord,
    serializer: &dyn ContentSerializer,
) -> AuditResult<Vec<(&'static str, SqlValue)>> {
    let content = (!record.content.is_empty()).then(|| record.content.clone());
    let details = record
        .error
        .as_ref()
        .map(|error| encode_error(error, serializer))
        .transpose()?;
    Ok(vec![
        ("Id", SqlValue::Uuid(record.id)),
        ("Type", SqlValue::Int(i64::from(record.kind.as_byte()))),
        ("ContentType", SqlValue::Text(record.content_type.clone())),
        ("Content", content.into()),
        ("Data", encode_data(&record.data, serializer)?.into()),
        ("CreatedAt", SqlValue::Timestamp(record.created_at)),
        ("ExecutionDuration", SqlValue::Int(i64::from(record.duration_millis()))),
        ("Status", SqlValue::Int(i64::from(record.status.as_byte()))),
        ("ErrorType", record.error_type().map(str::to_string).into()),
        ("ErrorMessage", record.error_message().map(str::to_string).into()),
        ("ErrorDetails", details.into()),
    ])
}

/// Renders the `INSERT` statement for one record.
///
/// # Errors
///
/// Returns `AuditError::Serialization` if the data or error details cannot be encoded.
pub fn insert_script(
    dialect: &dyn SqlDialect,
    table: &str,
    record: &MessageRecord,
    serializer: &dyn ContentSerializer,
) -> AuditResult<String> {
    let values = record_values(record, serializer)?;
    let columns: Vec<String> = values.iter().map(|(name, _)| dialect.quote(name)).collect();
    let literals: Vec<String> = values.iter().map(|(_, value)| dialect.literal(value)).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(table),
        columns.join(", "),
        literals.join(", ")
    ))
}

fn cell<'r>(row: &'r SqlRow, column: &'static str) -> AuditResult<&'r SqlValue> {
    row.get(column)
        .ok_or_else(|| AuditError::column(column, "missing from result row"))
}

fn byte(row: &SqlRow, column: &'static str) -> AuditResult<u8> {
    let value = cell(row, column)?.as_i64(column)?;
    u8::try_from(value).map_err(|_| AuditError::column(column, format!("{value} is out of range")))
}

/// Rebuilds a record from a result row.
///
/// Nullable columns may be absent from the row.
///
/// # Errors
///
/// Returns `AuditError::Column` for missing or mistyped columns and
/// `AuditError::Serialization` for undecodable data or error details.
pub fn record_from_row(
    row: &SqlRow,
    serializer: &dyn ContentSerializer,
) -> AuditResult<MessageRecord> {
    let optional = |column: &'static str| row.get(column).unwrap_or(&SqlValue::Null);

    let id = cell(row, "Id")?.as_uuid("Id")?;
    let kind_byte = byte(row, "Type")?;
    let kind = MessageKind::from_byte(kind_byte);
    let status_byte = byte(row, "Status")?;
    let status = ProcessingStatus::from_byte(status_byte)
        .ok_or_else(|| AuditError::column("Status", format!("unknown status {status_byte}")))?;
    let content_type = cell(row, "ContentType")?
        .as_text("ContentType")?
        .ok_or_else(|| AuditError::column("ContentType", "is NULL"))?;
    let created_at = cell(row, "CreatedAt")?.as_timestamp("CreatedAt")?;
    let millis = cell(row, "ExecutionDuration")?.as_i64("ExecutionDuration")?;

    let mut record = MessageRecord::new(id, kind, content_type)
        .with_status(status)
        .with_created_at(created_at)
        .with_execution_duration(Duration::from_millis(u64::try_from(millis).unwrap_or(0)));
    if let Some(content) = optional("Content").as_bytes("Content")? {
        record = record.with_content(content);
    }
    if let Some(data) = optional("Data").as_bytes("Data")? {
        record = record.with_data(decode_data(&data, serializer)?);
    }
    let details = optional("ErrorDetails").as_bytes("ErrorDetails")?;
    record.error = decode_error(
        details.as_deref(),
        optional("ErrorType").as_text("ErrorType")?,
        optional("ErrorMessage").as_text("ErrorMessage")?,
        serializer,
    )?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{BacktickDialect, BracketDialect, PlainDialect};
    use chrono::{TimeZone, Utc};
    use courier_core::{ErrorDescription, JsonContentSerializer, MessageData};
    use uuid::Uuid;

    fn failed_record() -> MessageRecord {
        let mut data = MessageData::new();
        data.insert("tenant".into(), "acme".into());
        MessageRecord::new(Uuid::now_v7(), MessageKind::Command, "orders.Cancel")
            .with_content(br#"{"order":1}"#.to_vec())
            .with_data(data)
            .with_created_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
            .with_execution_duration(Duration::from_millis(42))
            .with_status(ProcessingStatus::Failed)
            .with_error(ErrorDescription::new("Declined", "card 'expired'"))
    }

    #[test]
    fn test_create_table_per_dialect() {
        let bracket = create_table_script(&BracketDialect, DEFAULT_TABLE);
        assert!(bracket.starts_with("CREATE TABLE [Messages] (\n"));
        assert!(bracket.contains("[Sequence] BIGINT IDENTITY(1,1) NOT NULL PRIMARY KEY,"));
        assert!(bracket.contains("[Id] UNIQUEIDENTIFIER NOT NULL"));
        assert!(bracket.contains("[ErrorDetails] VARBINARY(MAX) NULL"));

        let backtick = create_table_script(&BacktickDialect, "audit");
        assert!(backtick.contains("`CreatedAt` DATETIME(6) NOT NULL"));

        let plain = create_table_script(&PlainDialect, "audit");
        assert!(plain.contains("Sequence INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert_eq!(plain.matches(" NULL").count(), COLUMNS.len());
    }

    #[test]
    fn test_insert_escapes_literals() {
        let record = failed_record();
        let sql = insert_script(&PlainDialect, "audit", &record, &JsonContentSerializer).unwrap();
        assert!(sql.starts_with("INSERT INTO audit (Id, Type, ContentType, Content, Data,"));
        assert!(sql.contains("'card ''expired'''"));
        assert!(sql.contains("'2024-01-02 03:04:05.000000'"));
        assert!(sql.contains(", 42, 3, 'Declined',"));
    }

    #[test]
    fn test_row_round_trip() {
        let record = failed_record();
        let row: SqlRow = record_values(&record, &JsonContentSerializer)
            .unwrap()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        let back = record_from_row(&row, &JsonContentSerializer).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.kind, record.kind);
        assert_eq!(back.content, record.content);
        assert_eq!(back.data, record.data);
        assert_eq!(back.created_at, record.created_at);
        assert_eq!(back.execution_duration, record.execution_duration);
        assert_eq!(back.status, ProcessingStatus::Failed);
        assert_eq!(back.error, record.error);
    }

    #[test]
    fn test_row_from_text_driver() {
        let id = Uuid::now_v7();
        let mut row = SqlRow::new();
        row.insert("Id".into(), SqlValue::Text(id.to_string()));
        row.insert("Type".into(), SqlValue::Text("3".into()));
        row.insert("ContentType".into(), "Shipped".into());
        row.insert("CreatedAt".into(), "2024-01-02 03:04:05.5".into());
        row.insert("ExecutionDuration".into(), SqlValue::Int(7));
        row.insert("Status".into(), SqlValue::Int(2));
        row.insert("ErrorType".into(), SqlValue::Null);

        let record = record_from_row(&row, &JsonContentSerializer).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.kind, MessageKind::Event);
        assert!(record.content.is_empty());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_missing_required_column() {
        let row = SqlRow::new();
        let err = record_from_row(&row, &JsonContentSerializer).unwrap_err();
        assert!(matches!(err, AuditError::Column { column: "Id", .. }));
    }
}
