//! The assembled set of pipelines.

use crate::error::{CourierError, CourierResult};
use courier_audit::sql::{DialectKind, SqlExecutor};
use courier_audit::{
    AuditMiddleware, FileMessageRepository, InMemoryMessageRepository, MessageQuery,
    MessageRecord, MessageRepository, SqlMessageRepository,
};
use courier_config::{AuditStoreConfig, CourierConfig, HandlerSearchMode, SqlDialectName};
use courier_core::di::{DependencyResolver, NullResolver};
use courier_core::{ContentTypeRegistry, MessageKind};
use courier_middleware::handlers::{HandlerModule, HandlerRegistry};
use courier_middleware::stages::ValidationMiddleware;
use courier_middleware::{
    CommandPipeline, ContainerMatch, EventPipeline, HandlerSearch, Pipeline, PipelineOptions,
    QueryPipeline,
};
use std::fmt;
use std::sync::Arc;

/// Command, query and event pipelines built from one configuration.
///
/// Each pipeline runs the default chain:
///
/// ```text
/// validation → handler_locator → handler_resolver → handler_executor → telemetry → audit
/// ```
///
/// The audit stage is present only when a repository is configured.
pub struct Courier {
    commands: CommandPipeline,
    queries: QueryPipeline,
    events: EventPipeline,
    repository: Option<Arc<dyn MessageRepository>>,
    config: CourierConfig,
}

impl Courier {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> CourierBuilder {
        CourierBuilder::new()
    }

    /// Returns the command pipeline.
    #[must_use]
    pub fn commands(&self) -> &CommandPipeline {
        &self.commands
    }

    /// Returns the query pipeline.
    #[must_use]
    pub fn queries(&self) -> &QueryPipeline {
        &self.queries
    }

    /// Returns the event pipeline.
    #[must_use]
    pub fn events(&self) -> &EventPipeline {
        &self.events
    }

    /// Returns the command pipeline for chain editing.
    pub fn commands_mut(&mut self) -> &mut CommandPipeline {
        &mut self.commands
    }

    /// Returns the query pipeline for chain editing.
    pub fn queries_mut(&mut self) -> &mut QueryPipeline {
        &mut self.queries
    }

    /// Returns the event pipeline for chain editing.
    pub fn events_mut(&mut self) -> &mut EventPipeline {
        &mut self.events
    }

    /// Returns the audit repository, if any.
    #[must_use]
    pub fn repository(&self) -> Option<&Arc<dyn MessageRepository>> {
        self.repository.as_ref()
    }

    /// Returns the configuration the pipelines were built from.
    #[must_use]
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Reads audit records.
    ///
    /// A query without `take` is limited to `audit.default_take` when that
    /// is configured. Without a repository nothing was recorded and the
    /// result is empty.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Audit` if the repository fails.
    pub fn records(&self, query: MessageQuery) -> CourierResult<Vec<MessageRecord>> {
        let Some(repository) = &self.repository else {
            return Ok(Vec::new());
        };
        let query = match (query.take, self.config.audit.default_take) {
            (None, Some(take)) => query.take(take),
            _ => query,
        };
        Ok(repository.get(&query)?)
    }
}

impl fmt::Debug for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Courier")
            .field("commands", &self.commands.pipeline().identifiers())
            .field("queries", &self.queries.pipeline().identifiers())
            .field("events", &self.events.pipeline().identifiers())
            .field("repository", &self.repository.as_ref().map(|r| r.name()))
            .finish_non_exhaustive()
    }
}

/// Builder for [`Courier`].
pub struct CourierBuilder {
    config: CourierConfig,
    resolver: Arc<dyn DependencyResolver>,
    modules: Vec<HandlerModule>,
    content_types: ContentTypeRegistry,
    validation: ValidationMiddleware,
    repository: Option<Arc<dyn MessageRepository>>,
    sql_executor: Option<Arc<dyn SqlExecutor>>,
}

impl CourierBuilder {
    /// Creates a builder with default configuration and no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CourierConfig::default(),
            resolver: Arc::new(NullResolver),
            modules: Vec::new(),
            content_types: ContentTypeRegistry::new(),
            validation: ValidationMiddleware::allow_all(),
            repository: None,
            sql_executor: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the dependency resolver handlers are obtained from.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Adds a handler module.
    #[must_use]
    pub fn module(mut self, module: HandlerModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Sets the payload types audit stores can reconstitute.
    #[must_use]
    pub fn content_types(mut self, content_types: ContentTypeRegistry) -> Self {
        self.content_types = content_types;
        self
    }

    /// Sets the validation stage.
    #[must_use]
    pub fn validation(mut self, validation: ValidationMiddleware) -> Self {
        self.validation = validation;
        self
    }

    /// Records every message in `repository`, regardless of `audit.store`.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn MessageRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Supplies the database connection for the `sql` audit store.
    #[must_use]
    pub fn sql_executor(mut self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.sql_executor = Some(executor);
        self
    }

    /// Builds the pipelines.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Config` for an invalid configuration,
    /// `CourierError::Pipeline` if the handler registry or a chain cannot be
    /// built, and `CourierError::MissingComponent` if the `sql` store is
    /// configured without an executor.
    pub fn build(self) -> CourierResult<Courier> {
        self.config.validate()?;

        let options = pipeline_options(&self.config).content_types(self.content_types);
        let registry = self
            .modules
            .into_iter()
            .fold(
                HandlerRegistry::builder().search(handler_search(&self.config)),
                |builder, module| builder.module(module),
            )
            .build()?;
        let registry = Arc::new(registry);

        let repository = match self.repository {
            Some(repository) => Some(repository),
            None if self.config.audit.enabled => Some(store_repository(
                &self.config.audit.store,
                &options,
                self.sql_executor,
            )?),
            None => None,
        };

        let chain = |name: &'static str, kind: MessageKind| -> CourierResult<Pipeline> {
            let mut builder = Pipeline::builder(name)
                .accept(kind)
                .options(options.clone())
                .resolver(Arc::clone(&self.resolver))
                .stage(self.validation.clone())
                .dispatch(Arc::clone(&registry))
                .telemetry();
            if let Some(repository) = &repository {
                builder = builder.stage(
                    AuditMiddleware::new(Arc::clone(repository))
                        .with_serializer(Arc::clone(&options.serializer)),
                );
            }
            Ok(builder.build()?)
        };

        let courier = Courier {
            commands: CommandPipeline::from_pipeline(chain("commands", MessageKind::Command)?)?,
            queries: QueryPipeline::from_pipeline(chain("queries", MessageKind::Query)?)?,
            events: EventPipeline::from_pipeline(chain("events", MessageKind::Event)?)?,
            repository,
            config: self.config,
        };

        tracing::info!(
            containers = registry.container_count(),
            audit = courier.repository.as_ref().map_or("none", |r| r.name()),
            preserve_original_error = courier.config.pipeline.preserve_original_error,
            "courier pipelines built"
        );
        Ok(courier)
    }
}

impl Default for CourierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CourierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourierBuilder")
            .field("config", &self.config)
            .field("modules", &self.modules.len())
            .field("validation", &self.validation)
            .field("repository", &self.repository.as_ref().map(|r| r.name()))
            .finish_non_exhaustive()
    }
}

/// Maps the `pipeline` section onto pipeline options.
#[must_use]
pub fn pipeline_options(config: &CourierConfig) -> PipelineOptions {
    PipelineOptions::new()
        .preserve_original_error(config.pipeline.preserve_original_error)
        .use_properties_resolving(config.pipeline.use_properties_resolving)
}

/// Maps the `pipeline.handler_search` section onto the locator's conventions.
#[must_use]
pub fn handler_search(config: &CourierConfig) -> HandlerSearch {
    let section = &config.pipeline.handler_search;
    HandlerSearch {
        container_match: match section.mode {
            HandlerSearchMode::Marked => ContainerMatch::Marked,
            HandlerSearchMode::Suffix => ContainerMatch::Suffix,
        },
        container_suffix: section.container_suffix.clone(),
        method_prefix: section.method_prefix.clone(),
        method_name: section.method_name.clone(),
    }
}

fn dialect_kind(name: SqlDialectName) -> DialectKind {
    match name {
        SqlDialectName::Bracket => DialectKind::Bracket,
        SqlDialectName::Backtick => DialectKind::Backtick,
        SqlDialectName::Plain => DialectKind::Plain,
    }
}

fn store_repository(
    store: &AuditStoreConfig,
    options: &PipelineOptions,
    sql_executor: Option<Arc<dyn SqlExecutor>>,
) -> CourierResult<Arc<dyn MessageRepository>> {
    let repository: Arc<dyn MessageRepository> = match store {
        AuditStoreConfig::Memory => Arc::new(InMemoryMessageRepository::new()),
        AuditStoreConfig::File { path, gzip } => Arc::new(
            FileMessageRepository::new(path)
                .with_gzip(*gzip)
                .with_serializer(Arc::clone(&options.serializer))
                .with_content_types(Arc::clone(&options.content_types)),
        ),
        AuditStoreConfig::Sql { dialect, table } => {
            let executor = sql_executor.ok_or(CourierError::MissingComponent {
                store: "sql",
                component: "an SQL executor",
            })?;
            Arc::new(
                SqlMessageRepository::new(executor, dialect_kind(*dialect))
                    .with_table(table.as_str())
                    .with_serializer(Arc::clone(&options.serializer)),
            )
        }
    };
    Ok(repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::{AuditConfig, HandlerSearchConfig, PipelineConfig};

    #[test]
    fn test_default_chain_without_audit() {
        let courier = Courier::builder().build().unwrap();
        assert!(courier.repository().is_none());
        assert_eq!(
            courier.commands().pipeline().identifiers(),
            vec![
                "validation",
                "handler_locator",
                "handler_resolver",
                "handler_executor",
                "telemetry"
            ]
        );
        assert!(courier.records(MessageQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_audit_enabled_appends_stage_everywhere() {
        let config = CourierConfig::builder()
            .audit(AuditConfig {
                enabled: true,
                ..AuditConfig::default()
            })
            .build();
        let courier = Courier::builder().config(config).build().unwrap();

        assert_eq!(courier.repository().unwrap().name(), "memory");
        for pipeline in [
            courier.commands().pipeline(),
            courier.queries().pipeline(),
            courier.events().pipeline(),
        ] {
            assert_eq!(pipeline.identifiers().last(), Some(&"audit"));
        }
    }

    #[test]
    fn test_sql_store_requires_executor() {
        let config = CourierConfig::builder()
            .audit(AuditConfig {
                enabled: true,
                default_take: None,
                store: AuditStoreConfig::Sql {
                    dialect: SqlDialectName::Plain,
                    table: "Messages".to_string(),
                },
            })
            .build();
        let err = Courier::builder().config(config).build().unwrap_err();
        assert!(matches!(
            err,
            CourierError::MissingComponent { store: "sql", .. }
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CourierConfig::builder()
            .audit(AuditConfig {
                default_take: Some(0),
                ..AuditConfig::default()
            })
            .build();
        assert!(matches!(
            Courier::builder().config(config).build(),
            Err(CourierError::Config(_))
        ));
    }

    #[test]
    fn test_config_mapping() {
        let config = CourierConfig::builder()
            .pipeline(PipelineConfig {
                preserve_original_error: true,
                use_properties_resolving: true,
                handler_search: HandlerSearchConfig {
                    mode: HandlerSearchMode::Suffix,
                    container_suffix: "Consumers".to_string(),
                    method_prefix: "On".to_string(),
                    method_name: None,
                },
            })
            .build();

        let options = pipeline_options(&config);
        assert!(options.preserve_original_error);
        assert!(options.use_properties_resolving);

        let search = handler_search(&config);
        assert_eq!(search.container_match, ContainerMatch::Suffix);
        assert!(search.matches_container("OrderConsumers", false));
        assert!(search.matches_method("OnCreated"));
        assert!(!search.matches_method("Handle"));
    }

    #[test]
    fn test_dialect_mapping() {
        assert_eq!(dialect_kind(SqlDialectName::Bracket), DialectKind::Bracket);
        assert_eq!(dialect_kind(SqlDialectName::Backtick), DialectKind::Backtick);
        assert_eq!(dialect_kind(SqlDialectName::Plain), DialectKind::Plain);
    }
}
