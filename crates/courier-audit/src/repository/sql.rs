use super::MessageRepository;
use crate::error::AuditResult;
use crate::query::MessageQuery;
use crate::record::MessageRecord;
use crate::sql::{
    create_table_script, insert_script, record_from_row, DialectKind, FilterScriptBuilder,
    SqlDialect, SqlExecutor, DEFAULT_TABLE,
};
use courier_core::{ContentSerializer, JsonContentSerializer};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Stores records in a relational table through an [`SqlExecutor`].
///
/// Statements are rendered in the configured dialect. `get` returns records
/// in the table's auto-increment order.
pub struct SqlMessageRepository<E> {
    executor: E,
    dialect: Box<dyn SqlDialect>,
    table: String,
    serializer: Arc<dyn ContentSerializer>,
}

impl<E: SqlExecutor> SqlMessageRepository<E> {
    /// Creates a repository over `executor` using the default table.
    pub fn new(executor: E, dialect: DialectKind) -> Self {
        Self {
            executor,
            dialect: dialect.dialect(),
            table: DEFAULT_TABLE.to_string(),
            serializer: Arc::new(JsonContentSerializer),
        }
    }

    /// Sets the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Replaces the content serializer.
    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn ContentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Returns the dialect.
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Returns the executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Creates the audit table.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Sql` if the executor fails.
    pub fn create_schema(&self) -> AuditResult<()> {
        let script = create_table_script(self.dialect(), &self.table);
        self.executor.execute(&script)?;
        Ok(())
    }

    /// Renders the select statement `get` would run for `query`.
    pub fn filter_script(&self, query: &MessageQuery) -> String {
        FilterScriptBuilder::new(self.dialect(), self.table.as_str())
            .filter(query)
            .build()
    }
}

impl<E: SqlExecutor> MessageRepository for SqlMessageRepository<E> {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn add(&self, record: &MessageRecord) -> AuditResult<()> {
        let script = insert_script(self.dialect(), &self.table, record, self.serializer.as_ref())?;
        self.executor.execute(&script)?;
        debug!(message_id = %record.id, dialect = %self.dialect.kind(), "Inserted audit row");
        Ok(())
    }

    fn get(&self, query: &MessageQuery) -> AuditResult<Vec<MessageRecord>> {
        // Validate patterns up front, same as the other stores.
        query.compile()?;
        let script = self.filter_script(query);
        self.executor
            .query(&script)?
            .iter()
            .map(|row| record_from_row(row, self.serializer.as_ref()))
            .collect()
    }
}

impl<E> fmt::Debug for SqlMessageRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlMessageRepository")
            .field("dialect", &self.dialect.kind())
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
