//! Handler traits and container registration.
//!
//! A *handler container* is an application type holding one or more handler
//! methods. Containers are registered once at startup, together with how to
//! construct them when the dependency resolver cannot supply an instance:
//!
//! ```
//! use courier_core::HandlerResult;
//! use courier_middleware::handlers::{ContainerRegistration, HandlesSync};
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize)]
//! struct Greet {
//!     name: String,
//!     reply: Option<String>,
//! }
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! impl HandlesSync<Greet> for Greeter {
//!     fn handle(&self, message: &mut Greet, _params: ()) -> HandlerResult {
//!         message.reply = Some(format!("{}, {}", self.greeting, message.name));
//!         Ok(())
//!     }
//! }
//!
//! let registration = ContainerRegistration::new(|()| Greeter { greeting: "Hello".into() })
//!     .marked()
//!     .method_sync::<Greet, ()>("Handle");
//! assert_eq!(registration.name(), "Greeter");
//! ```

use crate::handlers::params::HandlerParams;
use crate::middleware::BoxFuture;
use courier_core::di::{DependencyResolver, Instance, ResolutionError};
use courier_core::{
    GenericPayload, GenericSignature, HandlerError, HandlerResult, MessageContext, Payload,
};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// An asynchronous handler for messages of type `M`.
///
/// `P` lists the extra parameters bound by type; see
/// [`HandlerParams`](crate::handlers::HandlerParams).
pub trait Handles<M, P = ()>: Send + Sync + 'static {
    /// Handles the message. The payload may be modified in place.
    fn handle<'a>(&'a self, message: &'a mut M, params: P) -> BoxFuture<'a, HandlerResult>;
}

/// A synchronous handler for messages of type `M`.
pub trait HandlesSync<M, P = ()>: Send + Sync + 'static {
    /// Handles the message. The payload may be modified in place.
    fn handle(&self, message: &mut M, params: P) -> HandlerResult;
}

/// A message that carries its own handler.
///
/// Self-handling messages run after every container handler located for them.
pub trait SelfHandling<P = ()>: Payload {
    /// Handles the message.
    fn handle(&mut self, params: P) -> BoxFuture<'_, HandlerResult>;
}

/// Release hook for containers the pipeline constructed itself.
///
/// Instances returned by the dependency resolver are never disposed by the
/// pipeline.
pub trait Dispose: Send + Sync + 'static {
    /// Releases resources held by the instance.
    fn dispose(&self);
}

/// Why an invocation could not run or failed.
#[derive(Debug)]
pub(crate) enum InvokeError {
    /// A required parameter could not be bound.
    Binding(ResolutionError),
    /// The handler returned an error.
    Handler(HandlerError),
    /// The instance or payload had an unexpected type.
    Mismatch(&'static str),
}

pub(crate) type Invoker = Arc<
    dyn for<'a> Fn(
            Option<&'a (dyn Any + Send + Sync)>,
            &'a mut MessageContext,
        ) -> BoxFuture<'a, Result<(), InvokeError>>
        + Send
        + Sync,
>;

fn invoker<F>(f: F) -> Invoker
where
    F: for<'a> Fn(
            Option<&'a (dyn Any + Send + Sync)>,
            &'a mut MessageContext,
        ) -> BoxFuture<'a, Result<(), InvokeError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn instance_as<'a, H: 'static>(
    instance: Option<&'a (dyn Any + Send + Sync)>,
) -> Result<&'a H, InvokeError> {
    instance
        .and_then(|i| i.downcast_ref::<H>())
        .ok_or(InvokeError::Mismatch(std::any::type_name::<H>()))
}

fn payload_as<M: Payload>(ctx: &mut MessageContext) -> Result<&mut M, InvokeError> {
    ctx.message_mut()
        .content_mut()
        .downcast_mut::<M>()
        .ok_or(InvokeError::Mismatch(std::any::type_name::<M>()))
}

pub(crate) fn bound_invoker<H, M, P>() -> Invoker
where
    H: Handles<M, P>,
    M: Payload,
    P: HandlerParams,
{
    invoker(|instance, ctx| {
        Box::pin(async move {
            let handler = instance_as::<H>(instance)?;
            let params = P::bind(ctx).map_err(InvokeError::Binding)?;
            let message = payload_as::<M>(ctx)?;
            <H as Handles<M, P>>::handle(handler, message, params)
                .await
                .map_err(InvokeError::Handler)
        })
    })
}

pub(crate) fn sync_invoker<H, M, P>() -> Invoker
where
    H: HandlesSync<M, P>,
    M: Payload,
    P: HandlerParams,
{
    invoker(|instance, ctx| {
        Box::pin(async move {
            let handler = instance_as::<H>(instance)?;
            let params = P::bind(ctx).map_err(InvokeError::Binding)?;
            let message = payload_as::<M>(ctx)?;
            <H as HandlesSync<M, P>>::handle(handler, message, params).map_err(InvokeError::Handler)
        })
    })
}

pub(crate) fn self_invoker<M, P>() -> Invoker
where
    M: SelfHandling<P>,
    P: HandlerParams,
{
    invoker(|_instance, ctx| {
        Box::pin(async move {
            let params = P::bind(ctx).map_err(InvokeError::Binding)?;
            let message = payload_as::<M>(ctx)?;
            <M as SelfHandling<P>>::handle(message, params)
                .await
                .map_err(InvokeError::Handler)
        })
    })
}

/// Returns the last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

type ConstructFn = Arc<dyn Fn(&MessageContext, bool) -> Result<Instance, ResolutionError> + Send + Sync>;
type DisposeFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;
type PropertyFn<H> = Box<dyn Fn(&mut H, &dyn DependencyResolver) + Send + Sync>;

/// Type-erased facts about one registered container.
pub struct ContainerInfo {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    marked: bool,
    construct: Option<ConstructFn>,
    dispose: Option<DisposeFn>,
}

impl ContainerInfo {
    /// Describes a type that is only ever obtained from the dependency resolver.
    pub(crate) fn external(type_id: TypeId, type_name: &'static str) -> Self {
        Self {
            name: short_type_name(type_name).to_string(),
            type_id,
            type_name,
            marked: false,
            construct: None,
            dispose: None,
        }
    }

    /// Returns the container name used for convention matching.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the container's `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the container's Rust type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the container was explicitly marked.
    #[must_use]
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Returns `true` if the pipeline can construct the container itself.
    #[must_use]
    pub fn has_constructor(&self) -> bool {
        self.construct.is_some()
    }

    /// Builds a new instance through the registered constructor.
    pub(crate) fn construct(
        &self,
        ctx: &MessageContext,
        resolve_properties: bool,
    ) -> Option<Result<Instance, ResolutionError>> {
        self.construct
            .as_ref()
            .map(|construct| construct(ctx, resolve_properties))
    }

    /// Runs the disposal hook, if the container has one.
    pub(crate) fn dispose(&self, instance: &(dyn Any + Send + Sync)) {
        if let Some(dispose) = &self.dispose {
            dispose(instance);
        }
    }
}

impl fmt::Debug for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerInfo")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("marked", &self.marked)
            .field("constructor", &self.construct.is_some())
            .field("disposable", &self.dispose.is_some())
            .finish()
    }
}

/// A handler method of a container, with its type information erased.
#[derive(Clone)]
pub(crate) enum MethodEntry {
    /// A method bound to one concrete message type.
    Bound {
        name: &'static str,
        message_type: TypeId,
        invoker: Invoker,
    },
    /// A generic method with its compiled instantiations.
    Generic {
        name: &'static str,
        definition: String,
        arity: usize,
        instantiations: Vec<(Vec<String>, Invoker)>,
    },
}

impl MethodEntry {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Bound { name, .. } | Self::Generic { name, .. } => name,
        }
    }
}

/// A generic handler method template.
///
/// Rust resolves generics at compile time, so every message instantiation the
/// method must serve is listed explicitly. At dispatch time the instantiation
/// is chosen from the message's runtime type arguments.
///
/// ```
/// use courier_core::{GenericPayload, HandlerResult};
/// use courier_middleware::handlers::{BoxFuture, GenericMethod, Handles};
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct Envelope<T> {
///     body: T,
/// }
///
/// impl<T: Serialize + std::fmt::Debug + Send + Sync + 'static> GenericPayload for Envelope<T> {}
///
/// struct Relay;
///
/// impl<T: Send + Sync + 'static> Handles<Envelope<T>> for Relay {
///     fn handle<'a>(&'a self, _message: &'a mut Envelope<T>, _params: ()) -> BoxFuture<'a, HandlerResult> {
///         Box::pin(async { Ok(()) })
///     }
/// }
///
/// let method = GenericMethod::<Relay>::new("Handle")
///     .instantiate::<Envelope<u32>>()
///     .instantiate::<Envelope<String>>();
/// assert_eq!(method.arity(), Some(1));
/// ```
pub struct GenericMethod<H> {
    name: &'static str,
    template: Option<(String, usize)>,
    instantiations: Vec<(Vec<String>, Invoker)>,
    errors: Vec<String>,
    _container: PhantomData<fn() -> H>,
}

impl<H: Send + Sync + 'static> GenericMethod<H> {
    /// Creates an empty template with the given method name.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            template: None,
            instantiations: Vec::new(),
            errors: Vec::new(),
            _container: PhantomData,
        }
    }

    /// Adds an instantiation for message type `M` without extra parameters.
    #[must_use]
    pub fn instantiate<M>(self) -> Self
    where
        M: GenericPayload,
        H: Handles<M, ()>,
    {
        self.instantiate_with::<M, ()>()
    }

    /// Adds an instantiation for message type `M` with parameters `P`.
    #[must_use]
    pub fn instantiate_with<M, P>(mut self) -> Self
    where
        M: GenericPayload,
        P: HandlerParams,
        H: Handles<M, P>,
    {
        let signature = M::generic_signature();
        self.push(signature, bound_invoker::<H, M, P>());
        self
    }

    /// Adds a synchronous instantiation for message type `M` with parameters `P`.
    #[must_use]
    pub fn instantiate_sync<M, P>(mut self) -> Self
    where
        M: GenericPayload,
        P: HandlerParams,
        H: HandlesSync<M, P>,
    {
        let signature = M::generic_signature();
        self.push(signature, sync_invoker::<H, M, P>());
        self
    }

    fn push(&mut self, signature: GenericSignature, invoker: Invoker) {
        match &self.template {
            None => {
                self.template = Some((signature.definition.clone(), signature.arity()));
            }
            Some((definition, arity)) if !signature.instantiates(definition, *arity) => {
                self.errors.push(format!(
                    "generic method '{}' instantiated with {} which is not an instance of {}",
                    self.name, signature, definition
                ));
                return;
            }
            Some(_) => {}
        }
        self.instantiations.push((signature.type_arguments, invoker));
    }

    /// Returns the generic definition, once an instantiation was added.
    #[must_use]
    pub fn definition(&self) -> Option<&str> {
        self.template.as_ref().map(|(definition, _)| definition.as_str())
    }

    /// Returns the number of type parameters, once an instantiation was added.
    #[must_use]
    pub fn arity(&self) -> Option<usize> {
        self.template.as_ref().map(|(_, arity)| *arity)
    }
}

/// Registration of one handler container type.
pub struct ContainerRegistration<H> {
    name: String,
    marked: bool,
    constructor: Option<Arc<dyn Fn(&MessageContext) -> Result<H, ResolutionError> + Send + Sync>>,
    properties: Vec<PropertyFn<H>>,
    dispose: Option<fn(&H)>,
    methods: Vec<MethodEntry>,
    errors: Vec<String>,
}

impl<H: Send + Sync + 'static> ContainerRegistration<H> {
    fn empty() -> Self {
        Self {
            name: short_type_name(std::any::type_name::<H>()).to_string(),
            marked: false,
            constructor: None,
            properties: Vec::new(),
            dispose: None,
            methods: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Registers a container the pipeline can construct.
    ///
    /// The constructor's parameters are bound like handler parameters:
    /// `Option<Arc<T>>` arguments the resolver cannot supply are `None`.
    pub fn new<P, F>(constructor: F) -> Self
    where
        P: HandlerParams,
        F: Fn(P) -> H + Send + Sync + 'static,
    {
        let mut registration = Self::empty();
        registration.constructor = Some(Arc::new(move |ctx: &MessageContext| {
            P::bind(ctx).map(&constructor)
        }));
        registration
    }

    /// Registers a container constructed with `Default`.
    pub fn from_default() -> Self
    where
        H: Default,
    {
        Self::new(|()| H::default())
    }

    /// Registers a container that only the dependency resolver supplies.
    pub fn external() -> Self {
        Self::empty()
    }

    /// Overrides the name used for suffix matching.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Marks the type as a handler container.
    #[must_use]
    pub fn marked(mut self) -> Self {
        self.marked = true;
        self
    }

    /// Declares an injectable property.
    ///
    /// When property resolving is enabled, an unset property of a freshly
    /// constructed container is filled from the resolver. Resolution failures
    /// are logged and leave the property unset.
    #[must_use]
    pub fn property<T: Send + Sync + 'static>(
        mut self,
        name: &'static str,
        access: fn(&mut H) -> &mut Option<Arc<T>>,
    ) -> Self {
        self.properties.push(Box::new(move |handler: &mut H, resolver: &dyn DependencyResolver| {
            let slot = access(handler);
            if slot.is_some() {
                return;
            }
            match resolver.resolve_typed::<T>() {
                Ok(value) => *slot = Some(value),
                Err(e) => tracing::debug!(property = name, error = %e, "property left unset"),
            }
        }));
        self
    }

    /// Releases pipeline-constructed instances through [`Dispose`].
    #[must_use]
    pub fn disposable(mut self) -> Self
    where
        H: Dispose,
    {
        self.dispose = Some(<H as Dispose>::dispose);
        self
    }

    /// Registers an asynchronous handler method for `M`.
    #[must_use]
    pub fn method<M, P>(mut self, name: &'static str) -> Self
    where
        M: Payload,
        P: HandlerParams,
        H: Handles<M, P>,
    {
        self.methods.push(MethodEntry::Bound {
            name,
            message_type: TypeId::of::<M>(),
            invoker: bound_invoker::<H, M, P>(),
        });
        self
    }

    /// Registers a synchronous handler method for `M`.
    #[must_use]
    pub fn method_sync<M, P>(mut self, name: &'static str) -> Self
    where
        M: Payload,
        P: HandlerParams,
        H: HandlesSync<M, P>,
    {
        self.methods.push(MethodEntry::Bound {
            name,
            message_type: TypeId::of::<M>(),
            invoker: sync_invoker::<H, M, P>(),
        });
        self
    }

    /// Registers a generic handler method.
    #[must_use]
    pub fn generic(mut self, method: GenericMethod<H>) -> Self {
        self.errors.extend(method.errors);
        match method.template {
            Some((definition, arity)) => self.methods.push(MethodEntry::Generic {
                name: method.name,
                definition,
                arity,
                instantiations: method.instantiations,
            }),
            None => self.errors.push(format!(
                "generic method '{}' has no instantiations",
                method.name
            )),
        }
        self
    }

    /// Returns the container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub(crate) fn into_parts(self) -> (ContainerInfo, Vec<MethodEntry>, Vec<String>) {
        let Self {
            name,
            marked,
            constructor,
            properties,
            dispose,
            methods,
            errors,
        } = self;

        let construct: Option<ConstructFn> = constructor.map(|constructor| {
            let construct: ConstructFn = Arc::new(move |ctx: &MessageContext, resolve_properties: bool| {
                let mut handler = constructor(ctx)?;
                if resolve_properties {
                    for property in &properties {
                        property(&mut handler, ctx.resolver());
                    }
                }
                Ok(Arc::new(handler) as Instance)
            });
            construct
        });

        let dispose: Option<DisposeFn> = dispose.map(|dispose| {
            let erased: DisposeFn = Arc::new(move |instance: &(dyn Any + Send + Sync)| {
                if let Some(handler) = instance.downcast_ref::<H>() {
                    dispose(handler);
                }
            });
            erased
        });

        let info = ContainerInfo {
            name,
            type_id: TypeId::of::<H>(),
            type_name: std::any::type_name::<H>(),
            marked,
            construct,
            dispose,
        };
        (info, methods, errors)
    }
}

impl<H> fmt::Debug for ContainerRegistration<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerRegistration")
            .field("name", &self.name)
            .field("marked", &self.marked)
            .field("constructor", &self.constructor.is_some())
            .field("properties", &self.properties.len())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::di::{Container, NullResolver};
    use courier_core::{Message, MessageKind};
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Ping {
        pong: bool,
    }

    #[derive(Debug)]
    struct Clock;

    #[derive(Default)]
    struct PingHandlers {
        clock: Option<Arc<Clock>>,
    }

    impl HandlesSync<Ping> for PingHandlers {
        fn handle(&self, message: &mut Ping, _params: ()) -> HandlerResult {
            message.pong = true;
            Ok(())
        }
    }

    fn context(resolver: Arc<dyn DependencyResolver>) -> MessageContext {
        MessageContext::new(Message::new(MessageKind::Command, Ping { pong: false }), resolver)
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("app::orders::OrderHandlers"), "OrderHandlers");
        assert_eq!(short_type_name("app::Envelope<app::Order>"), "Envelope");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn test_registration_defaults() {
        let registration = ContainerRegistration::<PingHandlers>::from_default()
            .method_sync::<Ping, ()>("Handle");
        assert_eq!(registration.name(), "PingHandlers");
        assert_eq!(registration.method_count(), 1);

        let (info, methods, errors) = registration.into_parts();
        assert!(info.has_constructor());
        assert!(!info.is_marked());
        assert_eq!(methods[0].name(), "Handle");
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_bound_invoker_mutates_payload() {
        let registration = ContainerRegistration::<PingHandlers>::from_default()
            .method_sync::<Ping, ()>("Handle");
        let (info, methods, _) = registration.into_parts();

        let mut ctx = context(Arc::new(NullResolver));
        let instance = info.construct(&ctx, false).unwrap().unwrap();
        let MethodEntry::Bound { invoker, .. } = &methods[0] else {
            panic!("expected a bound method");
        };
        invoker(Some(instance.as_ref()), &mut ctx).await.unwrap();

        let ping = ctx.message().content().downcast_ref::<Ping>().unwrap();
        assert!(ping.pong);
    }

    #[test]
    fn test_properties_resolved_only_when_enabled() {
        let mut container = Container::new();
        container.register(Arc::new(Clock));
        let ctx = context(Arc::new(container));

        let registration = ContainerRegistration::<PingHandlers>::from_default()
            .property::<Clock>("clock", |h| &mut h.clock);
        let (info, _, _) = registration.into_parts();

        let without = info.construct(&ctx, false).unwrap().unwrap();
        assert!(without.downcast_ref::<PingHandlers>().unwrap().clock.is_none());

        let with = info.construct(&ctx, true).unwrap().unwrap();
        assert!(with.downcast_ref::<PingHandlers>().unwrap().clock.is_some());
    }

    #[test]
    fn test_external_has_no_constructor() {
        let (info, _, _) = ContainerRegistration::<PingHandlers>::external().into_parts();
        let ctx = context(Arc::new(NullResolver));
        assert!(info.construct(&ctx, false).is_none());
    }

    #[test]
    fn test_generic_without_instantiations_is_an_error() {
        let (_, methods, errors) = ContainerRegistration::<PingHandlers>::from_default()
            .generic(GenericMethod::new("Handle"))
            .into_parts();
        assert!(methods.is_empty());
        assert_eq!(errors.len(), 1);
    }
}
