//! Query pipeline.
//!
//! A query names a *query object* type and an expression to evaluate against
//! it. The query object is obtained like any handler container (resolver
//! first, then its registered constructor); the expression's value is the
//! query result. Query objects the pipeline constructed are disposed after
//! evaluation.
//!
//! ```
//! use courier_core::di::NullResolver;
//! use courier_middleware::handlers::{ContainerRegistration, HandlerModule, HandlerRegistry};
//! use courier_middleware::{PipelineOptions, QueryPipeline};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Catalog;
//!
//! impl Catalog {
//!     fn price_of(&self, sku: &str) -> Option<u32> {
//!         (sku == "tea").then_some(4)
//!     }
//! }
//!
//! let registry = HandlerRegistry::builder()
//!     .module(HandlerModule::new("shop").container(ContainerRegistration::<Catalog>::from_default()))
//!     .build()
//!     .unwrap();
//! let queries =
//!     QueryPipeline::new(Arc::new(registry), PipelineOptions::default(), Arc::new(NullResolver))
//!         .unwrap();
//!
//! let price = queries.query::<Catalog>().with(|catalog| catalog.price_of("tea")).unwrap();
//! assert_eq!(price, Some(4));
//! ```

use crate::handlers::registration::InvokeError;
use crate::handlers::HandlerRegistry;
use crate::middleware::BoxFuture;
use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;
use courier_core::di::DependencyResolver;
use courier_core::{
    CancellationToken, HandlerError, Message, MessageData, MessageKind, PipelineError,
    PipelineResult,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type BoxedValue = Box<dyn Any + Send + Sync>;

pub(crate) type QueryFn = Box<
    dyn for<'q> FnOnce(&'q (dyn Any + Send + Sync)) -> BoxFuture<'q, Result<BoxedValue, InvokeError>>
        + Send,
>;

fn query_fn<F>(f: F) -> QueryFn
where
    F: for<'q> FnOnce(&'q (dyn Any + Send + Sync)) -> BoxFuture<'q, Result<BoxedValue, InvokeError>>
        + Send
        + 'static,
{
    Box::new(f)
}

fn erase<Q, R, F>(expression: F) -> QueryFn
where
    Q: Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: for<'q> FnOnce(&'q Q) -> BoxFuture<'q, Result<R, HandlerError>> + Send + 'static,
{
    query_fn(move |target| {
        Box::pin(async move {
            let query = target
                .downcast_ref::<Q>()
                .ok_or(InvokeError::Mismatch(std::any::type_name::<Q>()))?;
            let value = expression(query).await.map_err(InvokeError::Handler)?;
            Ok(Box::new(value) as BoxedValue)
        })
    })
}

/// The query target and expression, handed from the caller to the executor.
pub(crate) struct QueryInvocation {
    target: TypeId,
    type_name: &'static str,
    evaluate: Mutex<Option<QueryFn>>,
}

impl QueryInvocation {
    pub(crate) fn target(&self) -> TypeId {
        self.target
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Takes the expression; it can be evaluated once.
    pub(crate) fn take(&self) -> Option<QueryFn> {
        self.evaluate.lock().take()
    }
}

/// The payload recorded for a query message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Type name of the query object.
    pub target: String,
    /// Caller-supplied label for the expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Pipeline for queries.
#[derive(Debug)]
pub struct QueryPipeline {
    pipeline: Pipeline,
}

impl QueryPipeline {
    /// Creates a query pipeline with the dispatch and telemetry stages.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the chain cannot be built.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        options: PipelineOptions,
        resolver: Arc<dyn DependencyResolver>,
    ) -> PipelineResult<Self> {
        Pipeline::builder("queries")
            .accept(MessageKind::Query)
            .options(options)
            .resolver(resolver)
            .dispatch(registry)
            .telemetry()
            .build()
            .and_then(Self::from_pipeline)
    }

    /// Wraps a pipeline that accepts queries.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the pipeline refuses queries.
    pub fn from_pipeline(pipeline: Pipeline) -> PipelineResult<Self> {
        if !pipeline.accepts(MessageKind::Query) {
            return Err(PipelineError::configuration(format!(
                "pipeline '{}' does not accept queries",
                pipeline.name()
            )));
        }
        Ok(Self { pipeline })
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the underlying pipeline for chain editing.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Starts a query against query objects of type `Q`.
    #[must_use]
    pub fn query<Q: Send + Sync + 'static>(&self) -> Query<'_, Q> {
        Query {
            pipeline: &self.pipeline,
            expression: None,
            cancellation: None,
            data: None,
            _target: PhantomData,
        }
    }
}

/// A pending query; evaluated by one of the `with` methods.
#[must_use = "a query does nothing until evaluated"]
pub struct Query<'p, Q> {
    pipeline: &'p Pipeline,
    expression: Option<String>,
    cancellation: Option<CancellationToken>,
    data: Option<MessageData>,
    _target: PhantomData<fn() -> Q>,
}

impl<'p, Q: Send + Sync + 'static> Query<'p, Q> {
    /// Labels the expression in logs and audit records.
    pub fn named(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Attaches side-channel data to the query message.
    pub fn with_data(mut self, data: MessageData) -> Self {
        self.data = Some(data);
        self
    }

    /// Evaluates `expression`, blocking until the result is available.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub fn with<R, F>(self, expression: F) -> PipelineResult<R>
    where
        R: Send + Sync + 'static,
        F: FnOnce(&Q) -> R + Send + 'static,
    {
        crate::blocking::block_on(self.execute(erase(move |query: &Q| {
            let value = expression(query);
            Box::pin(std::future::ready(Ok(value)))
        })))
    }

    /// Evaluates a fallible `expression`, blocking until the result is available.
    ///
    /// An `Err` is reported like a failing handler.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub fn try_with<R, E, F>(self, expression: F) -> PipelineResult<R>
    where
        R: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce(&Q) -> Result<R, E> + Send + 'static,
    {
        crate::blocking::block_on(self.execute(erase(move |query: &Q| {
            let value = expression(query).map_err(HandlerError::from);
            Box::pin(std::future::ready(value))
        })))
    }

    /// Evaluates an asynchronous `expression`.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub async fn with_async<R, F>(self, expression: F) -> PipelineResult<R>
    where
        R: Send + Sync + 'static,
        F: for<'q> FnOnce(&'q Q) -> BoxFuture<'q, R> + Send + 'static,
    {
        self.execute(erase(move |query: &Q| {
            let pending = expression(query);
            Box::pin(async move { Ok(pending.await) })
        }))
        .await
    }

    /// Evaluates a fallible asynchronous `expression`.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::invoke_async`].
    pub async fn try_with_async<R, F>(self, expression: F) -> PipelineResult<R>
    where
        R: Send + Sync + 'static,
        F: for<'q> FnOnce(&'q Q) -> BoxFuture<'q, Result<R, HandlerError>> + Send + 'static,
    {
        self.execute(erase(expression)).await
    }

    async fn execute<R: Send + Sync + 'static>(self, evaluate: QueryFn) -> PipelineResult<R> {
        let type_name = std::any::type_name::<Q>();
        let request = QueryRequest {
            target: type_name.to_string(),
            expression: self.expression,
        };
        let mut message = Message::new(MessageKind::Query, request).with_content_type(type_name);
        if let Some(data) = self.data {
            message = message.with_data(data);
        }

        let mut ctx = self.pipeline.context_with_cancellation(message, self.cancellation);
        ctx.set_extension(QueryInvocation {
            target: TypeId::of::<Q>(),
            type_name,
            evaluate: Mutex::new(Some(evaluate)),
        });

        self.pipeline.invoke_async(&mut ctx).await?;
        ctx.take_result::<R>().ok_or_else(|| {
            PipelineError::invalid_state(format!(
                "query on {type_name} produced no {}",
                std::any::type_name::<R>()
            ))
        })
    }
}

impl<Q> fmt::Debug for Query<'_, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("target", &std::any::type_name::<Q>())
            .field("pipeline", &self.pipeline.name())
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}
