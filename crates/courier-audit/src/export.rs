//! CSV export of audit records.
//!
//! The export has a fixed 11-column header:
//!
//! ```text
//! Id,Type,CreatedAt,Status,ContentType,Content,Data,ErrorType,ErrorMessage,ErrorDetails,ExecutionDuration
//! ```
//!
//! Fields containing a comma, quote, CR or LF are wrapped in double quotes
//! with inner quotes doubled. Content is written as text, data and error
//! details as compact JSON, and the duration in milliseconds.

use crate::error::AuditResult;
use crate::record::MessageRecord;
use chrono::SecondsFormat;
use courier_core::SerializationError;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::io::Write;

/// The export header, in column order.
pub const HEADER: [&str; 11] = [
    "Id",
    "Type",
    "CreatedAt",
    "Status",
    "ContentType",
    "Content",
    "Data",
    "ErrorType",
    "ErrorMessage",
    "ErrorDetails",
    "ExecutionDuration",
];

fn fields(record: &MessageRecord) -> AuditResult<[String; 11]> {
    let data = if record.data.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&record.data).map_err(SerializationError::from)?
    };
    let details = match &record.error {
        Some(error) => serde_json::to_string(error).map_err(SerializationError::from)?,
        None => String::new(),
    };
    Ok([
        record.id.to_string(),
        record.kind.name().to_string(),
        record.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        record.status.name().to_string(),
        record.content_type.clone(),
        String::from_utf8_lossy(&record.content).into_owned(),
        data,
        record.error_type().unwrap_or_default().to_string(),
        record.error_message().unwrap_or_default().to_string(),
        details,
        record.duration_millis().to_string(),
    ])
}

/// Writes the header and one row per record.
///
/// # Errors
///
/// Returns `AuditError::Csv` if writing fails and `AuditError::Serialization`
/// if data or error details cannot be encoded.
pub fn write_records<'r, W: Write>(
    writer: W,
    records: impl IntoIterator<Item = &'r MessageRecord>,
) -> AuditResult<()> {
    let mut csv = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::CRLF)
        .from_writer(writer);
    csv.write_record(HEADER)?;
    for record in records {
        csv.write_record(fields(record)?)?;
    }
    csv.flush()?;
    Ok(())
}

/// Renders the export into a string.
///
/// # Errors
///
/// See [`write_records`].
pub fn to_csv_string<'r>(
    records: impl IntoIterator<Item = &'r MessageRecord>,
) -> AuditResult<String> {
    let mut out = Vec::new();
    write_records(&mut out, records)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
