//! Audit error types.

use courier_core::SerializationError;
use thiserror::Error;

/// Errors raised by audit repositories and tooling.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Reading or writing the underlying store failed.
    #[error("audit store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Content, data or error details could not be (de)serialized.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A complete frame was read but its chunks do not form a record.
    #[error("malformed audit frame: {reason}")]
    MalformedFrame {
        /// What was wrong with the frame.
        reason: String,
    },

    /// A content-type or error-type pattern could not be compiled.
    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex error.
        #[source]
        source: regex::Error,
    },

    /// Writing the CSV export failed.
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    /// The SQL executor reported a failure.
    #[error("SQL execution failed: {message}")]
    Sql {
        /// The executor's message.
        message: String,
    },

    /// A result row could not be mapped to a record.
    #[error("unexpected value in column {column}: {reason}")]
    Column {
        /// The column name.
        column: &'static str,
        /// What was wrong with the value.
        reason: String,
    },
}

impl AuditError {
    /// Creates a malformed-frame error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Creates an SQL executor error.
    #[must_use]
    pub fn sql(message: impl Into<String>) -> Self {
        Self::Sql {
            message: message.into(),
        }
    }

    /// Creates a column mapping error.
    #[must_use]
    pub fn column(column: &'static str, reason: impl Into<String>) -> Self {
        Self::Column {
            column,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error only concerns one frame of a stream.
    ///
    /// Readers skip such frames and continue with the next one.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedFrame { .. })
    }
}

/// Result alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
