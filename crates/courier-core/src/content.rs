//! Content types and payload serialization.
//!
//! A message's content type is the canonical name used both to locate its
//! handler and to rebuild the payload when an audit record is read back. The
//! [`ContentTypeRegistry`] is the set of payload types an application makes
//! known for that purpose; it is built once at startup and passed explicitly to
//! whatever needs it.
//!
//! # Example
//!
//! ```rust
//! use courier_core::ContentTypeRegistry;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct PlaceOrder {
//!     sku: String,
//! }
//!
//! let mut registry = ContentTypeRegistry::new();
//! registry.register_as::<PlaceOrder>("PlaceOrder");
//!
//! let payload = registry
//!     .decode("PlaceOrder", serde_json::json!({ "sku": "A-1" }))
//!     .unwrap();
//! assert_eq!(payload.downcast_ref::<PlaceOrder>().unwrap().sku, "A-1");
//! ```

use crate::error::SerializationError;
use crate::message::Payload;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Encodes payloads, side-channel data and error details to bytes.
///
/// Supplied through configuration; the audit subsystem uses it for the
/// `Content`, `Data` and `ErrorDetails` chunks of a record.
pub trait ContentSerializer: Send + Sync + fmt::Debug {
    /// A short name used in error messages.
    fn name(&self) -> &'static str;

    /// Encodes a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` when the value cannot be encoded.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, SerializationError>;

    /// Decodes bytes produced by [`ContentSerializer::encode`].
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` when the bytes are malformed.
    fn decode(&self, bytes: &[u8]) -> Result<Value, SerializationError>;

    /// Encodes a payload.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` when the payload cannot be serialized.
    fn encode_payload(&self, payload: &dyn Payload) -> Result<Vec<u8>, SerializationError> {
        let value = payload.to_value()?;
        self.encode(&value)
    }
}

/// The default serializer: compact UTF-8 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContentSerializer;

impl ContentSerializer for JsonContentSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, SerializationError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The shape of a generic payload type: its definition and type arguments.
///
/// `Envelope<Order>` has the definition `Envelope` and one type argument,
/// `Order`. Generic handler templates are matched on the definition and
/// arity, then instantiated for the concrete arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericSignature {
    /// The generic type name without its arguments.
    pub definition: String,
    /// The concrete type arguments, in declaration order.
    pub type_arguments: Vec<String>,
}

impl GenericSignature {
    /// Creates a signature from its parts.
    #[must_use]
    pub fn new(definition: impl Into<String>, type_arguments: Vec<String>) -> Self {
        Self {
            definition: definition.into(),
            type_arguments,
        }
    }

    /// Parses a type name such as `app::Envelope<app::Order, u32>`.
    ///
    /// Returns `None` for non-generic names or unbalanced brackets.
    #[must_use]
    pub fn parse(type_name: &str) -> Option<Self> {
        let open = type_name.find('<')?;
        let inner = type_name.get(open + 1..)?.strip_suffix('>')?;

        let mut type_arguments = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, ch) in inner.char_indices() {
            match ch {
                '<' | '(' | '[' => depth += 1,
                '>' | ')' | ']' => depth = depth.checked_sub(1)?,
                ',' if depth == 0 => {
                    type_arguments.push(inner[start..i].trim().to_string());
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return None;
        }
        let last = inner[start..].trim();
        if last.is_empty() {
            return None;
        }
        type_arguments.push(last.to_string());

        Some(Self::new(&type_name[..open], type_arguments))
    }

    /// Returns the signature of `T`, derived from its Rust type name.
    #[must_use]
    pub fn of<T: ?Sized>() -> Option<Self> {
        Self::parse(std::any::type_name::<T>())
    }

    /// Returns the number of type arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.type_arguments.len()
    }

    /// Returns `true` if this signature instantiates `definition` with `arity` arguments.
    #[must_use]
    pub fn instantiates(&self, definition: &str, arity: usize) -> bool {
        self.definition == definition && self.arity() == arity
    }
}

impl fmt::Display for GenericSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.definition, self.type_arguments.join(", "))
    }
}

/// A payload type that is an instantiation of a generic definition.
///
/// The default signature is derived from the Rust type name, which is enough
/// for handler matching inside one build of the application.
pub trait GenericPayload: Payload + Sized {
    /// Returns the generic signature of this instantiation.
    fn generic_signature() -> GenericSignature {
        let name = std::any::type_name::<Self>();
        GenericSignature::parse(name).unwrap_or_else(|| GenericSignature::new(name, Vec::new()))
    }
}

type DecodeFn = fn(Value) -> serde_json::Result<Box<dyn Payload>>;

fn decode_as<T: Payload + DeserializeOwned>(value: Value) -> serde_json::Result<Box<dyn Payload>> {
    let payload: T = serde_json::from_value(value)?;
    Ok(Box::new(payload))
}

/// What the registry knows about one payload type.
#[derive(Clone)]
pub struct ContentTypeInfo {
    name: String,
    type_id: TypeId,
    rust_type: &'static str,
    generic: Option<GenericSignature>,
    decode: DecodeFn,
}

impl ContentTypeInfo {
    /// Returns the canonical content-type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the payload's `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the payload's Rust type name.
    #[must_use]
    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }

    /// Returns the generic signature, for generic payloads.
    #[must_use]
    pub fn generic(&self) -> Option<&GenericSignature> {
        self.generic.as_ref()
    }

    /// Rebuilds a payload from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError::Json` when the value does not match the type.
    pub fn decode(&self, value: Value) -> Result<Box<dyn Payload>, SerializationError> {
        Ok((self.decode)(value)?)
    }
}

impl fmt::Debug for ContentTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTypeInfo")
            .field("name", &self.name)
            .field("rust_type", &self.rust_type)
            .field("generic", &self.generic)
            .finish_non_exhaustive()
    }
}

/// Registry of known payload types.
#[derive(Debug, Default, Clone)]
pub struct ContentTypeRegistry {
    by_name: HashMap<String, Arc<ContentTypeInfo>>,
    by_type: HashMap<TypeId, Arc<ContentTypeInfo>>,
}

impl ContentTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under its Rust type name.
    pub fn register<T: Payload + DeserializeOwned>(&mut self) -> &mut Self {
        self.insert::<T>(std::any::type_name::<T>().to_string(), None)
    }

    /// Registers `T` under an explicit canonical name.
    pub fn register_as<T: Payload + DeserializeOwned>(&mut self, name: impl Into<String>) -> &mut Self {
        self.insert::<T>(name.into(), None)
    }

    /// Registers an instantiation of a generic payload under its Rust type name.
    pub fn register_generic<T: GenericPayload + DeserializeOwned>(&mut self) -> &mut Self {
        self.insert::<T>(
            std::any::type_name::<T>().to_string(),
            Some(T::generic_signature()),
        )
    }

    fn insert<T: Payload + DeserializeOwned>(
        &mut self,
        name: String,
        generic: Option<GenericSignature>,
    ) -> &mut Self {
        let info = Arc::new(ContentTypeInfo {
            name: name.clone(),
            type_id: TypeId::of::<T>(),
            rust_type: std::any::type_name::<T>(),
            generic,
            decode: decode_as::<T>,
        });
        if let Some(previous) = self.by_type.insert(TypeId::of::<T>(), Arc::clone(&info)) {
            self.by_name.remove(previous.name());
        }
        self.by_name.insert(name, info);
        self
    }

    /// Looks up a content type by canonical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ContentTypeInfo> {
        self.by_name.get(name).map(Arc::as_ref)
    }

    /// Looks up a content type by payload `TypeId`.
    #[must_use]
    pub fn get_by_type(&self, type_id: TypeId) -> Option<&ContentTypeInfo> {
        self.by_type.get(&type_id).map(Arc::as_ref)
    }

    /// Returns the canonical name for a payload, falling back to its Rust type name.
    #[must_use]
    pub fn name_of(&self, payload: &dyn Payload) -> String {
        self.get_by_type(payload.as_any().type_id())
            .map_or_else(|| payload.type_name().to_string(), |info| info.name.clone())
    }

    /// Returns the generic signature of a payload, if it is registered as generic.
    #[must_use]
    pub fn signature_of(&self, payload: &dyn Payload) -> Option<&GenericSignature> {
        self.get_by_type(payload.as_any().type_id())
            .and_then(ContentTypeInfo::generic)
    }

    /// Rebuilds a payload of the named content type.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError::UnknownContentType` for unregistered names
    /// and `SerializationError::Json` when the value does not match.
    pub fn decode(&self, name: &str, value: Value) -> Result<Box<dyn Payload>, SerializationError> {
        self.get(name)
            .ok_or_else(|| SerializationError::UnknownContentType(name.to_string()))?
            .decode(value)
    }

    /// Returns `true` if the name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the registered names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
