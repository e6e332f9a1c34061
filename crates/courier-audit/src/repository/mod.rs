//! Append-only stores of [`MessageRecord`]s.

mod file;
mod memory;
mod sql;

pub use file::FileMessageRepository;
pub use memory::InMemoryMessageRepository;
pub use sql::SqlMessageRepository;

use crate::error::AuditResult;
use crate::query::MessageQuery;
use crate::record::MessageRecord;

/// An append-only store of message records.
///
/// Implementations must be safe to share between concurrently running
/// pipelines. `add` never mutates or deduplicates existing records.
pub trait MessageRepository: Send + Sync {
    /// Returns a short name for logs.
    fn name(&self) -> &'static str;

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns an `AuditError` if the store cannot be written.
    fn add(&self, record: &MessageRecord) -> AuditResult<()>;

    /// Returns the records matching every set predicate of `query`.
    ///
    /// # Errors
    ///
    /// Returns an `AuditError` if the store cannot be read or the query is invalid.
    fn get(&self, query: &MessageQuery) -> AuditResult<Vec<MessageRecord>>;
}
