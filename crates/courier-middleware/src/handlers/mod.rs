//! Handler registration and dispatch metadata.
//!
//! Handlers are registered once at startup into [`HandlerModule`]s, which are
//! then frozen into a [`HandlerRegistry`]. The registry maps each payload type
//! to its [`HandlerDescriptor`]s: bound methods, generic method instantiations
//! and self-handling messages.

pub mod params;
pub mod registration;
pub mod registry;

pub use crate::middleware::BoxFuture;
pub use params::HandlerParams;
pub use registration::{
    ContainerInfo, ContainerRegistration, Dispose, GenericMethod, Handles, HandlesSync,
    SelfHandling,
};
pub use registry::{HandlerDescriptor, HandlerModule, HandlerRegistry, HandlerRegistryBuilder};
