//! SQL rendering for the audit schema.
//!
//! Three dialects share one logical query model:
//!
//! | Dialect | Identifiers | Pagination |
//! |---------|-------------|------------|
//! | [`BracketDialect`] | `[Id]` | `ORDER BY … OFFSET n ROWS FETCH NEXT m ROWS ONLY` |
//! | [`BacktickDialect`] | `` `Id` `` | `LIMIT m OFFSET n` |
//! | [`PlainDialect`] | `Id` | `LIMIT m OFFSET n`, `IS [NOT] NULL` for null comparisons |
//!
//! Scripts are plain text with inlined literals. They are meant for
//! inspection tooling and trusted filters, not for untrusted input.

mod dialect;
mod filter;
mod schema;
mod value;

pub use dialect::{
    BacktickDialect, BracketDialect, Comparison, DialectKind, PlainDialect, SqlDialect, LIKE_ESCAPE,
};
pub use filter::FilterScriptBuilder;
pub use schema::{
    create_table_script, insert_script, record_from_row, record_values, ColumnType, COLUMNS,
    DEFAULT_TABLE, SEQUENCE_COLUMN,
};
pub use value::{SqlRow, SqlValue};

use crate::error::AuditResult;
use std::sync::Arc;

/// Runs rendered statements against a database.
///
/// Implemented by the host application over its driver of choice.
pub trait SqlExecutor: Send + Sync {
    /// Executes a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Sql` on driver failures.
    fn execute(&self, sql: &str) -> AuditResult<u64>;

    /// Runs a query, returning its rows keyed by column name.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Sql` on driver failures.
    fn query(&self, sql: &str) -> AuditResult<Vec<SqlRow>>;
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for Arc<T> {
    fn execute(&self, sql: &str) -> AuditResult<u64> {
        (**self).execute(sql)
    }

    fn query(&self, sql: &str) -> AuditResult<Vec<SqlRow>> {
        (**self).query(sql)
    }
}
