//! Handler modules and the dispatch registry.
//!
//! Discovery is scoped: the application hands the registry an explicit list of
//! [`HandlerModule`]s, and only containers registered in those modules are
//! considered. The registry is built once; lookups are cached per payload type.

use crate::handlers::params::HandlerParams;
use crate::handlers::registration::{
    self_invoker, ContainerInfo, ContainerRegistration, Invoker, MethodEntry, SelfHandling,
};
use crate::options::HandlerSearch;
use courier_core::{GenericSignature, Payload, PipelineError, PipelineResult};
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named set of handler registrations, the unit of discovery.
#[derive(Default)]
pub struct HandlerModule {
    name: String,
    containers: Vec<(ContainerInfo, Vec<MethodEntry>, Vec<String>)>,
    self_handlers: Vec<(TypeId, Invoker)>,
}

impl HandlerModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            containers: Vec::new(),
            self_handlers: Vec::new(),
        }
    }

    /// Adds a handler container.
    #[must_use]
    pub fn container<H: Send + Sync + 'static>(mut self, registration: ContainerRegistration<H>) -> Self {
        self.containers.push(registration.into_parts());
        self
    }

    /// Adds a self-handling message type.
    #[must_use]
    pub fn self_handling<M, P>(mut self) -> Self
    where
        M: SelfHandling<P>,
        P: HandlerParams,
    {
        self.self_handlers
            .push((TypeId::of::<M>(), self_invoker::<M, P>()));
        self
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for HandlerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerModule")
            .field("name", &self.name)
            .field("containers", &self.containers.len())
            .field("self_handlers", &self.self_handlers.len())
            .finish()
    }
}

/// Who owns a located handler method.
#[derive(Clone)]
pub(crate) enum HandlerTarget {
    /// A method on a handler container.
    Container(Arc<ContainerInfo>),
    /// A method on the message itself.
    Message,
}

/// The located method.
#[derive(Clone)]
pub(crate) enum HandlerMethod {
    /// A method bound to the concrete message type.
    Bound { name: &'static str, invoker: Invoker },
    /// A generic method instantiated for the message's type arguments.
    Generic {
        name: &'static str,
        signature: GenericSignature,
        invoker: Invoker,
    },
    /// A query object; the caller supplies the expression to evaluate.
    Query,
}

/// One located handler: a target and the method to call on it.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub(crate) target: HandlerTarget,
    pub(crate) method: HandlerMethod,
}

impl HandlerDescriptor {
    pub(crate) fn query(container: Arc<ContainerInfo>) -> Self {
        Self {
            target: HandlerTarget::Container(container),
            method: HandlerMethod::Query,
        }
    }

    /// Returns the method name (`"Query"` for query objects).
    #[must_use]
    pub fn method_name(&self) -> &'static str {
        match &self.method {
            HandlerMethod::Bound { name, .. } | HandlerMethod::Generic { name, .. } => name,
            HandlerMethod::Query => "Query",
        }
    }

    /// Returns the container, or `None` for self-handling messages.
    #[must_use]
    pub fn container(&self) -> Option<&ContainerInfo> {
        match &self.target {
            HandlerTarget::Container(info) => Some(info),
            HandlerTarget::Message => None,
        }
    }

    /// Returns `true` if the handler is the message itself.
    #[must_use]
    pub fn is_self_handling(&self) -> bool {
        matches!(self.target, HandlerTarget::Message)
    }

    /// Returns the instantiation signature of a generic method.
    #[must_use]
    pub fn generic_signature(&self) -> Option<&GenericSignature> {
        match &self.method {
            HandlerMethod::Generic { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub(crate) fn invoker(&self) -> Option<&Invoker> {
        match &self.method {
            HandlerMethod::Bound { invoker, .. } | HandlerMethod::Generic { invoker, .. } => {
                Some(invoker)
            }
            HandlerMethod::Query => None,
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("container", &self.container().map(ContainerInfo::name))
            .field("method", &self.method_name())
            .field("generic", &self.generic_signature())
            .finish()
    }
}

struct RegisteredContainer {
    module: String,
    info: Arc<ContainerInfo>,
    methods: Vec<MethodEntry>,
}

/// The handler registry.
pub struct HandlerRegistry {
    search: HandlerSearch,
    containers: Vec<RegisteredContainer>,
    by_type: HashMap<TypeId, Arc<ContainerInfo>>,
    self_handlers: Vec<(TypeId, Invoker)>,
    cache: DashMap<TypeId, Arc<[HandlerDescriptor]>>,
}

impl HandlerRegistry {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Creates a registry with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            search: HandlerSearch::default(),
            containers: Vec::new(),
            by_type: HashMap::new(),
            self_handlers: Vec::new(),
            cache: DashMap::new(),
        }
    }

    /// Returns the naming conventions in force.
    #[must_use]
    pub fn search(&self) -> &HandlerSearch {
        &self.search
    }

    /// Returns the number of registered containers.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Looks up a registered container by type.
    #[must_use]
    pub fn container(&self, type_id: TypeId) -> Option<Arc<ContainerInfo>> {
        self.by_type.get(&type_id).cloned()
    }

    /// Locates the handlers for a payload.
    ///
    /// Candidates come in module order, then container registration order,
    /// then method registration order; self-handling messages come last.
    /// `signature` is the payload's generic signature, when it has one.
    pub fn locate(
        &self,
        payload: &dyn Payload,
        signature: Option<&GenericSignature>,
    ) -> Arc<[HandlerDescriptor]> {
        let type_id = payload.as_any().type_id();
        if let Some(hit) = self.cache.get(&type_id) {
            return Arc::clone(hit.value());
        }

        let located: Arc<[HandlerDescriptor]> = self.scan(type_id, signature).into();
        tracing::debug!(
            payload = payload.type_name(),
            handlers = located.len(),
            "handler lookup cached"
        );
        self.cache.insert(type_id, Arc::clone(&located));
        located
    }

    fn scan(&self, type_id: TypeId, signature: Option<&GenericSignature>) -> Vec<HandlerDescriptor> {
        let mut located = Vec::new();

        for container in &self.containers {
            if !self
                .search
                .matches_container(container.info.name(), container.info.is_marked())
            {
                continue;
            }

            for method in &container.methods {
                if !self.search.matches_method(method.name()) {
                    continue;
                }
                let target = HandlerTarget::Container(Arc::clone(&container.info));

                match method {
                    MethodEntry::Bound {
                        name,
                        message_type,
                        invoker,
                    } if *message_type == type_id => located.push(HandlerDescriptor {
                        target,
                        method: HandlerMethod::Bound {
                            name,
                            invoker: Arc::clone(invoker),
                        },
                    }),
                    MethodEntry::Generic {
                        name,
                        definition,
                        arity,
                        instantiations,
                    } => {
                        let Some(signature) = signature else { continue };
                        if !signature.instantiates(definition, *arity) {
                            continue;
                        }
                        match instantiations
                            .iter()
                            .find(|(arguments, _)| *arguments == signature.type_arguments)
                        {
                            Some((_, invoker)) => located.push(HandlerDescriptor {
                                target,
                                method: HandlerMethod::Generic {
                                    name,
                                    signature: signature.clone(),
                                    invoker: Arc::clone(invoker),
                                },
                            }),
                            None => tracing::warn!(
                                module = %container.module,
                                container = container.info.name(),
                                method = name,
                                message = %signature,
                                "generic handler has no instantiation for these type arguments"
                            ),
                        }
                    }
                    MethodEntry::Bound { .. } => {}
                }
            }
        }

        for (message_type, invoker) in &self.self_handlers {
            if *message_type == type_id {
                located.push(HandlerDescriptor {
                    target: HandlerTarget::Message,
                    method: HandlerMethod::Bound {
                        name: "Handle",
                        invoker: Arc::clone(invoker),
                    },
                });
            }
        }

        located
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("search", &self.search)
            .field("containers", &self.containers.len())
            .field("self_handlers", &self.self_handlers.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// Builder for [`HandlerRegistry`].
#[derive(Debug, Default)]
pub struct HandlerRegistryBuilder {
    search: HandlerSearch,
    modules: Vec<HandlerModule>,
}

impl HandlerRegistryBuilder {
    /// Sets the naming conventions.
    #[must_use]
    pub fn search(mut self, search: HandlerSearch) -> Self {
        self.search = search;
        self
    }

    /// Adds a module to scan.
    #[must_use]
    pub fn module(mut self, module: HandlerModule) -> Self {
        self.modules.push(module);
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` when a container type is
    /// registered twice or a generic method is inconsistent.
    pub fn build(self) -> PipelineResult<HandlerRegistry> {
        let mut registry = HandlerRegistry::empty();
        registry.search = self.search;

        for module in self.modules {
            let HandlerModule {
                name: module_name,
                containers,
                self_handlers,
            } = module;

            for (info, methods, errors) in containers {
                if let Some(error) = errors.into_iter().next() {
                    return Err(PipelineError::configuration(format!(
                        "module '{}', container '{}': {}",
                        module_name,
                        info.name(),
                        error
                    )));
                }
                if registry.by_type.contains_key(&info.type_id()) {
                    return Err(PipelineError::configuration(format!(
                        "container '{}' is registered more than once",
                        info.type_name()
                    )));
                }

                let info = Arc::new(info);
                registry.by_type.insert(info.type_id(), Arc::clone(&info));
                registry.containers.push(RegisteredContainer {
                    module: module_name.clone(),
                    info,
                    methods,
                });
            }

            registry.self_handlers.extend(self_handlers);
        }

        tracing::debug!(
            containers = registry.containers.len(),
            self_handlers = registry.self_handlers.len(),
            "handler registry built"
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::registration::{GenericMethod, Handles, HandlesSync};
    use crate::middleware::BoxFuture;
    use crate::options::ContainerMatch;
    use courier_core::{GenericPayload, HandlerResult};
    use serde::Serialize;

    #[derive(Debug, Serialize)]
    struct Created;

    #[derive(Debug, Serialize)]
    struct Envelope<T> {
        body: T,
    }

    impl<T: Serialize + fmt::Debug + Send + Sync + 'static> GenericPayload for Envelope<T> {}

    #[derive(Default)]
    struct AuditHandlers;

    impl HandlesSync<Created> for AuditHandlers {
        fn handle(&self, _message: &mut Created, _params: ()) -> HandlerResult {
            Ok(())
        }
    }

    impl<T: Send + Sync + 'static> Handles<Envelope<T>> for AuditHandlers {
        fn handle<'a>(&'a self, _message: &'a mut Envelope<T>, _params: ()) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct Projections;

    impl HandlesSync<Created> for Projections {
        fn handle(&self, _message: &mut Created, _params: ()) -> HandlerResult {
            Ok(())
        }
    }

    fn module() -> HandlerModule {
        HandlerModule::new("app")
            .container(
                ContainerRegistration::<AuditHandlers>::from_default()
                    .marked()
                    .method_sync::<Created, ()>("HandleCreated")
                    .generic(GenericMethod::new("Handle").instantiate::<Envelope<u32>>()),
            )
            .container(
                ContainerRegistration::<Projections>::from_default()
                    .method_sync::<Created, ()>("Handle"),
            )
    }

    #[test]
    fn test_marked_mode_skips_unmarked_containers() {
        let registry = HandlerRegistry::builder().module(module()).build().unwrap();
        let located = registry.locate(&Created, None);
        assert_eq!(located.len(), 1);
        assert_eq!(located[0].container().unwrap().name(), "AuditHandlers");
        assert_eq!(located[0].method_name(), "HandleCreated");
    }

    #[test]
    fn test_suffix_mode_accepts_named_containers() {
        let registry = HandlerRegistry::builder()
            .search(HandlerSearch {
                container_match: ContainerMatch::Suffix,
                container_suffix: "Projections".to_string(),
                ..HandlerSearch::default()
            })
            .module(module())
            .build()
            .unwrap();
        assert_eq!(registry.locate(&Created, None).len(), 2);
    }

    #[test]
    fn test_exact_method_name_override() {
        let registry = HandlerRegistry::builder()
            .search(HandlerSearch {
                method_name: Some("Handle".to_string()),
                ..HandlerSearch::default()
            })
            .module(module())
            .build()
            .unwrap();
        assert!(registry.locate(&Created, None).is_empty());
    }

    #[test]
    fn test_generic_instantiation_selected_by_arguments() {
        let registry = HandlerRegistry::builder().module(module()).build().unwrap();

        let known = Envelope { body: 1_u32 };
        let signature = Envelope::<u32>::generic_signature();
        let located = registry.locate(&known, Some(&signature));
        assert_eq!(located.len(), 1);
        assert_eq!(located[0].generic_signature(), Some(&signature));

        let unknown = Envelope { body: "x".to_string() };
        let signature = Envelope::<String>::generic_signature();
        assert!(registry.locate(&unknown, Some(&signature)).is_empty());
    }

    #[test]
    fn test_duplicate_container_is_rejected() {
        let result = HandlerRegistry::builder()
            .module(HandlerModule::new("a").container(ContainerRegistration::<Projections>::from_default()))
            .module(HandlerModule::new("b").container(ContainerRegistration::<Projections>::from_default()))
            .build();
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_lookup_is_cached() {
        let registry = HandlerRegistry::builder().module(module()).build().unwrap();
        let first = registry.locate(&Created, None);
        let second = registry.locate(&Created, None);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
