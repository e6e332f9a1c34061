use super::dialect::{Comparison, SqlDialect};
use super::schema::{COLUMNS, SEQUENCE_COLUMN};
use super::value::SqlValue;
use crate::query::MessageQuery;
use std::time::Duration;

/// Renders a `SELECT` over the audit table in one dialect.
///
/// Conditions are joined with `AND`. A pattern containing `*` is rendered as
/// `LIKE` with every other character matching itself; patterns without `*`
/// compare with `=`.
///
/// ```
/// use courier_audit::sql::{FilterScriptBuilder, PlainDialect};
/// use courier_audit::MessageQuery;
///
/// let script = FilterScriptBuilder::new(&PlainDialect, "Messages")
///     .filter(&MessageQuery::new().content_type("orders.*").take(10))
///     .build();
/// assert!(script.ends_with(r"WHERE ContentType LIKE 'orders.%' ESCAPE '\' ORDER BY Sequence LIMIT 10"));
/// ```
#[derive(Debug)]
pub struct FilterScriptBuilder<'d> {
    dialect: &'d dyn SqlDialect,
    table: String,
    conditions: Vec<String>,
    order: Vec<(String, bool)>,
    skip: usize,
    take: Option<usize>,
}

impl<'d> FilterScriptBuilder<'d> {
    /// Starts an unfiltered, unordered select from `table`.
    #[must_use]
    pub fn new(dialect: &'d dyn SqlDialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            conditions: Vec::new(),
            order: Vec::new(),
            skip: 0,
            take: None,
        }
    }

    /// Adds every set predicate of `query`, its pagination and the
    /// insertion order of the table.
    #[must_use]
    pub fn filter(mut self, query: &MessageQuery) -> Self {
        if let Some(id) = query.id {
            self = self.condition("Id", Comparison::Eq, id);
        }
        if let Some(from) = query.created_from {
            self = self.condition("CreatedAt", Comparison::Ge, from);
        }
        if let Some(to) = query.created_to {
            self = self.condition("CreatedAt", Comparison::Le, to);
        }
        if let Some(pattern) = &query.content_type {
            self = self.like("ContentType", pattern);
        }
        if let Some(pattern) = &query.error_type {
            self = self.like("ErrorType", pattern);
        }
        if let Some(status) = query.status {
            self = self.condition("Status", Comparison::Eq, i64::from(status.as_byte()));
        }
        if let Some(kind) = query.kind {
            self = self.condition("Type", Comparison::Eq, i64::from(kind.as_byte()));
        }
        if let Some(min) = query.min_duration {
            self = self.condition("ExecutionDuration", Comparison::Ge, millis(min));
        }
        if let Some(max) = query.max_duration {
            self = self.condition("ExecutionDuration", Comparison::Le, millis(max));
        }
        self.order_by(SEQUENCE_COLUMN, false)
            .skip(query.skip)
            .take_opt(query.take)
    }

    /// Adds `column <op> value`.
    #[must_use]
    pub fn condition(mut self, column: &str, op: Comparison, value: impl Into<SqlValue>) -> Self {
        self.conditions
            .push(self.dialect.comparison(column, op, &value.into()));
        self
    }

    /// Adds a `*` pattern match on `column`.
    #[must_use]
    pub fn like(mut self, column: &str, pattern: &str) -> Self {
        if pattern.contains('*') {
            self.conditions.push(self.dialect.like(column, pattern));
            self
        } else {
            self.condition(column, Comparison::Eq, pattern)
        }
    }

    /// Appends an `ORDER BY` term.
    #[must_use]
    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order.push((column.to_string(), descending));
        self
    }

    /// Skips the first `count` rows.
    #[must_use]
    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    /// Returns at most `count` rows.
    #[must_use]
    pub fn take(self, count: usize) -> Self {
        self.take_opt(Some(count))
    }

    fn take_opt(mut self, count: Option<usize>) -> Self {
        self.take = count;
        self
    }

    /// Renders the script.
    #[must_use]
    pub fn build(&self) -> String {
        let d = self.dialect;
        let columns: Vec<String> = COLUMNS.iter().map(|(name, _, _)| d.quote(name)).collect();
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), d.quote(&self.table));

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }

        let pagination = d.paginate(self.skip, self.take);
        if !self.order.is_empty() {
            let terms: Vec<String> = self
                .order
                .iter()
                .map(|(column, descending)| {
                    if *descending {
                        format!("{} DESC", d.quote(column))
                    } else {
                        d.quote(column)
                    }
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        } else if pagination.is_some() && d.requires_order_for_paging() {
            sql.push_str(" ORDER BY (SELECT NULL)");
        }

        if let Some(pagination) = pagination {
            sql.push(' ');
            sql.push_str(&pagination);
        }
        sql
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
