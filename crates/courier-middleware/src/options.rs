//! Per-pipeline options.
//!
//! Everything a pipeline would otherwise read from process-wide state lives
//! here: the content serializer, the error describer, the content-type
//! registry and the dispatch switches. Options are fixed when a pipeline is
//! built; they cannot be changed per call.
//!
//! [`HandlerSearch`] is consumed by the handler registry when it is built.

use courier_core::{
    ContentSerializer, ContentTypeRegistry, DefaultErrorDescriber, ErrorDescriber,
    JsonContentSerializer,
};
use std::fmt;
use std::sync::Arc;

/// How handler containers are recognised inside a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerMatch {
    /// Only containers registered with [`crate::handlers::ContainerRegistration::marked`].
    #[default]
    Marked,
    /// Any container whose name ends with the configured suffix.
    Suffix,
}

/// Naming conventions used by the handler locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSearch {
    /// How containers are recognised.
    pub container_match: ContainerMatch,
    /// Container name suffix used by [`ContainerMatch::Suffix`].
    pub container_suffix: String,
    /// Method name prefix (`Handle`, `HandleCreated`, ...).
    pub method_prefix: String,
    /// Exact method name; overrides the prefix when set.
    pub method_name: Option<String>,
}

impl HandlerSearch {
    /// Returns `true` if a container name satisfies the convention.
    #[must_use]
    pub fn matches_container(&self, name: &str, marked: bool) -> bool {
        match self.container_match {
            ContainerMatch::Marked => marked,
            ContainerMatch::Suffix => marked || name.ends_with(&self.container_suffix),
        }
    }

    /// Returns `true` if a method name satisfies the convention.
    #[must_use]
    pub fn matches_method(&self, name: &str) -> bool {
        match &self.method_name {
            Some(exact) => name == exact,
            None => name.starts_with(&self.method_prefix),
        }
    }
}

impl Default for HandlerSearch {
    fn default() -> Self {
        Self {
            container_match: ContainerMatch::Marked,
            container_suffix: "Handlers".to_string(),
            method_prefix: "Handle".to_string(),
            method_name: None,
        }
    }
}

/// Options shared by every stage of one pipeline.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Re-raise handler errors unmodified instead of wrapping them.
    pub preserve_original_error: bool,
    /// Fill unset injectable properties of freshly constructed handlers.
    pub use_properties_resolving: bool,
    /// Serializer for payloads, side-channel data and error details.
    pub serializer: Arc<dyn ContentSerializer>,
    /// Turns errors into persisted descriptions.
    pub describer: Arc<dyn ErrorDescriber>,
    /// Known payload types.
    pub content_types: Arc<ContentTypeRegistry>,
}

impl PipelineOptions {
    /// Creates options with the default serializer and describer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether original handler errors are preserved.
    #[must_use]
    pub fn preserve_original_error(mut self, preserve: bool) -> Self {
        self.preserve_original_error = preserve;
        self
    }

    /// Sets whether handler properties are resolved after construction.
    #[must_use]
    pub fn use_properties_resolving(mut self, enabled: bool) -> Self {
        self.use_properties_resolving = enabled;
        self
    }

    /// Sets the content serializer.
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn ContentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Sets the error describer.
    #[must_use]
    pub fn describer(mut self, describer: Arc<dyn ErrorDescriber>) -> Self {
        self.describer = describer;
        self
    }

    /// Sets the content-type registry.
    #[must_use]
    pub fn content_types(mut self, registry: ContentTypeRegistry) -> Self {
        self.content_types = Arc::new(registry);
        self
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preserve_original_error: false,
            use_properties_resolving: false,
            serializer: Arc::new(JsonContentSerializer),
            describer: Arc::new(DefaultErrorDescriber),
            content_types: Arc::new(ContentTypeRegistry::new()),
        }
    }
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("preserve_original_error", &self.preserve_original_error)
            .field("use_properties_resolving", &self.use_properties_resolving)
            .field("serializer", &self.serializer.name())
            .field("content_types", &self.content_types.len())
            .finish_non_exhaustive()
    }
}
