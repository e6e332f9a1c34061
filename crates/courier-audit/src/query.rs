//! Filter descriptors for reading audit records.

use crate::error::{AuditError, AuditResult};
use crate::record::MessageRecord;
use chrono::{DateTime, Utc};
use courier_core::{MessageKind, ProcessingStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A set of optional predicates plus `skip`/`take` pagination.
///
/// Every unset predicate matches all records. Set predicates are combined
/// with AND. Content-type and error-type patterns are exact unless they
/// contain `*`, which matches any run of characters.
///
/// ```
/// use courier_audit::MessageQuery;
/// use courier_core::ProcessingStatus;
///
/// let query = MessageQuery::new()
///     .content_type("orders.*")
///     .status(ProcessingStatus::Failed)
///     .take(50);
/// assert_eq!(query.take, Some(50));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQuery {
    /// Exact message id.
    pub id: Option<Uuid>,
    /// Inclusive lower bound on the creation time.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the creation time.
    pub created_to: Option<DateTime<Utc>>,
    /// Content-type pattern.
    pub content_type: Option<String>,
    /// Error-type pattern.
    pub error_type: Option<String>,
    /// Final status.
    pub status: Option<ProcessingStatus>,
    /// Message kind.
    pub kind: Option<MessageKind>,
    /// Inclusive lower bound on the execution duration.
    pub min_duration: Option<Duration>,
    /// Inclusive upper bound on the execution duration.
    pub max_duration: Option<Duration>,
    /// Number of matching records to skip.
    pub skip: usize,
    /// Maximum number of records to return.
    pub take: Option<usize>,
}

impl MessageQuery {
    /// Creates a query that matches every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches one message id.
    #[must_use]
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Matches records created at or after `from`.
    #[must_use]
    pub fn created_from(mut self, from: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self
    }

    /// Matches records created at or before `to`.
    #[must_use]
    pub fn created_to(mut self, to: DateTime<Utc>) -> Self {
        self.created_to = Some(to);
        self
    }

    /// Matches content types against a `*` pattern.
    #[must_use]
    pub fn content_type(mut self, pattern: impl Into<String>) -> Self {
        self.content_type = Some(pattern.into());
        self
    }

    /// Matches error types against a `*` pattern.
    #[must_use]
    pub fn error_type(mut self, pattern: impl Into<String>) -> Self {
        self.error_type = Some(pattern.into());
        self
    }

    /// Matches one status.
    #[must_use]
    pub fn status(mut self, status: ProcessingStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Matches one message kind.
    #[must_use]
    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Matches records that ran at least `duration`.
    #[must_use]
    pub fn min_duration(mut self, duration: Duration) -> Self {
        self.min_duration = Some(duration);
        self
    }

    /// Matches records that ran at most `duration`.
    #[must_use]
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Skips the first `count` matches.
    #[must_use]
    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    /// Returns at most `count` matches.
    #[must_use]
    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    /// Compiles the patterns for repeated matching.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::InvalidPattern` if a pattern cannot be compiled.
    pub fn compile(&self) -> AuditResult<CompiledQuery<'_>> {
        Ok(CompiledQuery {
            query: self,
            content_type: self.content_type.as_deref().map(wildcard).transpose()?,
            error_type: self.error_type.as_deref().map(wildcard).transpose()?,
        })
    }

    /// Filters and paginates `records`, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::InvalidPattern` if a pattern cannot be compiled.
    pub fn apply<'r>(
        &self,
        records: impl IntoIterator<Item = &'r MessageRecord>,
    ) -> AuditResult<Vec<MessageRecord>> {
        let compiled = self.compile()?;
        Ok(records
            .into_iter()
            .filter(|record| compiled.matches(record))
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// A [`MessageQuery`] with compiled patterns.
#[derive(Debug)]
pub struct CompiledQuery<'q> {
    query: &'q MessageQuery,
    content_type: Option<Regex>,
    error_type: Option<Regex>,
}

impl CompiledQuery<'_> {
    /// Returns `true` if `record` satisfies every set predicate.
    ///
    /// Pagination is not applied.
    #[must_use]
    pub fn matches(&self, record: &MessageRecord) -> bool {
        let q = self.query;
        q.id.map_or(true, |id| record.id == id)
            && q.created_from.map_or(true, |from| record.created_at >= from)
            && q.created_to.map_or(true, |to| record.created_at <= to)
            && self
                .content_type
                .as_ref()
                .map_or(true, |pattern| pattern.is_match(&record.content_type))
            && self.error_type.as_ref().map_or(true, |pattern| {
                record.error_type().is_some_and(|t| pattern.is_match(t))
            })
            && q.status.map_or(true, |status| record.status == status)
            && q.kind.map_or(true, |kind| record.kind == kind)
            && q.min_duration.map_or(true, |min| record.execution_duration >= min)
            && q.max_duration.map_or(true, |max| record.execution_duration <= max)
    }
}

fn wildcard(pattern: &str) -> AuditResult<Regex> {
    let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^{}$", body.join(".*"))).map_err(|source| AuditError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
