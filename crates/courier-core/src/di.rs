//! Dependency resolution.
//!
//! The host application supplies a single capability to Courier: given a
//! type, return an instance or fail. That capability is the
//! [`DependencyResolver`] trait. [`Container`] is the built-in implementation,
//! keyed by `TypeId` and holding `Arc`-wrapped services.
//!
//! # Example
//!
//! ```rust
//! use courier_core::di::{Container, DependencyResolver};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Database {
//!     connection_string: "postgres://localhost/db".to_string(),
//! }));
//!
//! let resolver: &dyn DependencyResolver = &container;
//! let db: Arc<Database> = resolver.resolve_typed().unwrap();
//! assert_eq!(db.connection_string, "postgres://localhost/db");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type-erased, shareable service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    /// The type name that could not be resolved.
    pub type_name: &'static str,
    /// The reason for the failure.
    pub reason: String,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to resolve {}: {}", self.type_name, self.reason)
    }
}

impl std::error::Error for ResolutionError {}

impl ResolutionError {
    /// Creates an error for a type nobody registered.
    #[must_use]
    pub fn not_registered(type_name: &'static str) -> Self {
        Self {
            type_name,
            reason: "service not registered".to_string(),
        }
    }

    /// Creates an error for an instance of the wrong type.
    #[must_use]
    pub fn type_mismatch(type_name: &'static str) -> Self {
        Self {
            type_name,
            reason: "resolver returned an instance of a different type".to_string(),
        }
    }

    /// Creates an error with a custom reason.
    #[must_use]
    pub fn custom(type_name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            type_name,
            reason: reason.into(),
        }
    }
}

/// The dependency resolution boundary.
///
/// Implementations must be thread-safe: one resolver is shared by every
/// concurrent pipeline invocation.
pub trait DependencyResolver: Send + Sync + 'static {
    /// Returns an instance of the requested type.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` when the type has no binding.
    fn resolve(&self, type_id: TypeId, type_name: &'static str) -> Result<Instance, ResolutionError>;
}

impl dyn DependencyResolver {
    /// Resolves and downcasts an instance of `T`.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` when `T` has no binding or the binding has
    /// the wrong type.
    pub fn resolve_typed<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolutionError> {
        let type_name = std::any::type_name::<T>();
        self.resolve(TypeId::of::<T>(), type_name)?
            .downcast::<T>()
            .map_err(|_| ResolutionError::type_mismatch(type_name))
    }

    /// Resolves `T`, returning `None` instead of an error.
    #[must_use]
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self.resolve_typed::<T>() {
            Ok(instance) => Some(instance),
            Err(e) => {
                tracing::trace!(error = %e, "dependency left unresolved");
                None
            }
        }
    }
}

/// A resolver with no bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl DependencyResolver for NullResolver {
    fn resolve(&self, _type_id: TypeId, type_name: &'static str) -> Result<Instance, ResolutionError> {
        Err(ResolutionError::not_registered(type_name))
    }
}

/// A dependency injection container.
///
/// The container stores Arc-wrapped services keyed by their type.
/// Services are registered once at startup and resolved by type during
/// message processing.
#[derive(Default)]
pub struct Container {
    services: HashMap<TypeId, Instance>,
}

impl Container {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Registers a service in the container, replacing any previous binding.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Resolves a service from the container.
    ///
    /// Returns `None` if the service is not registered.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|s| s.clone().downcast::<T>().ok())
    }

    /// Checks if a service is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl DependencyResolver for Container {
    fn resolve(&self, type_id: TypeId, type_name: &'static str) -> Result<Instance, ResolutionError> {
        self.services
            .get(&type_id)
            .cloned()
            .ok_or_else(|| ResolutionError::not_registered(type_name))
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.services.len())
            .finish()
    }
}

/// A required dependency.
///
/// As a handler parameter, `Inject<T>` fails the invocation when `T` cannot be
/// resolved, whereas `Option<Arc<T>>` falls back to `None`.
#[derive(Clone)]
pub struct Inject<T>(pub Arc<T>);

impl<T> Inject<T> {
    /// Creates a new `Inject` wrapper.
    pub fn new(inner: Arc<T>) -> Self {
        Self(inner)
    }

    /// Converts into the inner `Arc`.
    pub fn into_inner(self) -> Arc<T> {
        self.0
    }
}

impl<T> std::ops::Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Inject").field(&self.0).finish()
    }
}

impl<T: Send + Sync + 'static> Inject<T> {
    /// Resolves the dependency.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` if the service cannot be resolved.
    pub fn from_resolver(resolver: &dyn DependencyResolver) -> Result<Self, ResolutionError> {
        resolver.resolve_typed::<T>().map(Inject)
    }
}
