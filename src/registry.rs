//! Discriminator <-> element type registry
//!
//! A [`TypeTagRegistry`] is the bijection between the string
//! discriminators found on the wire and the concrete Rust types they stand
//! for. It can only be produced by [`RegistryBuilder::build`] (or
//! [`TypeTagRegistry::from_mappings`]), which rejects duplicates on either
//! side, and it exposes no way to change it afterwards.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tagseq::registry::TypeTagRegistry;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Video {
//!     id: String,
//! }
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Comment {
//!     body: String,
//! }
//!
//! let registry = TypeTagRegistry::builder()
//!     .register::<Video>("video")
//!     .register::<Comment>("comment")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(registry.discriminator_for::<Video>(), Some("video"));
//! ```

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Write;

use serde::{Serialize, de::DeserializeOwned, ser::Error as _};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ConfigurationError, Result, SequenceError};
use crate::types::{Element, TokenKind};

type DecodeFn = fn(&[u8]) -> serde_json::Result<Box<dyn Element>>;
type EncodeFn = fn(&dyn Element) -> serde_json::Result<Vec<u8>>;
type FromValueFn = fn(Value) -> serde_json::Result<Box<dyn Element>>;
type ToValueFn = fn(&dyn Element) -> serde_json::Result<Value>;

/// Descriptor of a concrete element type
///
/// Carries the type's identity and the serde functions used to decode and
/// encode its payload, either as raw JSON bytes or as a [`Value`] for
/// formats other than JSON.
#[derive(Clone, Copy)]
pub struct ElementType {
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn,
    encode: EncodeFn,
    from_value: FromValueFn,
    to_value: ToValueFn,
}

impl ElementType {
    /// Describes `T`.
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: Element + Serialize + DeserializeOwned,
    {
        ElementType {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            decode: decode_as::<T>,
            encode: encode_as::<T>,
            from_value: from_value_as::<T>,
            to_value: to_value_as::<T>,
        }
    }

    /// [`TypeId`] of the described type
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the described type, for diagnostics
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Decodes exactly one payload object into the described type.
    ///
    /// # Errors
    /// Serde errors are returned unchanged as [`SequenceError::Payload`].
    pub fn decode(&self, payload: &[u8]) -> Result<Box<dyn Element>> {
        Ok((self.decode)(payload)?)
    }

    /// Encodes `element` as a payload object.
    ///
    /// Nothing is written unless the payload serializes to a JSON object,
    /// since anything else could not be decoded again.
    ///
    /// # Errors
    /// - [`SequenceError::NonObjectPayload`] for payloads that are not objects
    /// - [`SequenceError::Payload`] for serde errors, including when
    ///   `element` is not of the described type
    /// - [`SequenceError::Io`] when `out` fails
    pub fn encode(&self, element: &dyn Element, out: &mut dyn Write) -> Result<()> {
        let payload = (self.encode)(element)?;

        if payload.first() != Some(&b'{') {
            return Err(self.non_object(TokenKind::of_leading_byte(payload.first())));
        }

        out.write_all(&payload)?;
        Ok(())
    }

    /// Builds the described type from an already parsed payload.
    ///
    /// # Errors
    /// Serde errors are returned unchanged as [`SequenceError::Payload`].
    pub fn from_value(&self, payload: Value) -> Result<Box<dyn Element>> {
        Ok((self.from_value)(payload)?)
    }

    /// Converts `element` into a payload object.
    ///
    /// # Errors
    /// Same as [`encode`](Self::encode), minus IO.
    pub fn to_value(&self, element: &dyn Element) -> Result<Value> {
        let payload = (self.to_value)(element)?;

        if !payload.is_object() {
            return Err(self.non_object(TokenKind::of_value(&payload)));
        }

        Ok(payload)
    }

    fn non_object(&self, actual: TokenKind) -> SequenceError {
        warn!(type_name = self.type_name, %actual, "Payload is not an object");
        SequenceError::NonObjectPayload {
            type_name: self.type_name,
            actual,
        }
    }
}

impl Debug for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ElementType").field(&self.type_name).finish()
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ElementType {}

fn decode_as<T>(payload: &[u8]) -> serde_json::Result<Box<dyn Element>>
where
    T: Element + DeserializeOwned,
{
    let value: T = serde_json::from_slice(payload)?;
    Ok(Box::new(value))
}

fn from_value_as<T>(payload: Value) -> serde_json::Result<Box<dyn Element>>
where
    T: Element + DeserializeOwned,
{
    let value: T = serde_json::from_value(payload)?;
    Ok(Box::new(value))
}

fn concrete_as<T: Element>(element: &dyn Element) -> serde_json::Result<&T> {
    element.downcast_ref::<T>().ok_or_else(|| {
        serde_json::Error::custom(format!(
            "expected `{}`, found `{}`",
            type_name::<T>(),
            element.concrete().type_name()
        ))
    })
}

fn encode_as<T>(element: &dyn Element) -> serde_json::Result<Vec<u8>>
where
    T: Element + Serialize,
{
    serde_json::to_vec(concrete_as::<T>(element)?)
}

fn to_value_as<T>(element: &dyn Element) -> serde_json::Result<Value>
where
    T: Element + Serialize,
{
    serde_json::to_value(concrete_as::<T>(element)?)
}

/// Collects mappings before they are frozen into a [`TypeTagRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    mappings: Vec<(String, ElementType)>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `discriminator` to `T`.
    #[must_use]
    pub fn register<T>(self, discriminator: impl Into<String>) -> Self
    where
        T: Element + Serialize + DeserializeOwned,
    {
        self.with(discriminator, ElementType::of::<T>())
    }

    /// Maps `discriminator` to an already built descriptor.
    #[must_use]
    pub fn with(mut self, discriminator: impl Into<String>, element_type: ElementType) -> Self {
        self.mappings.push((discriminator.into(), element_type));
        self
    }

    /// Freezes the collected mappings.
    ///
    /// # Errors
    /// Fails if any discriminator or type was registered twice. The builder
    /// is consumed either way.
    pub fn build(self) -> Result<TypeTagRegistry, ConfigurationError> {
        TypeTagRegistry::from_mappings(self.mappings)
    }
}

/// Frozen bijection between discriminators and element types.
///
/// Lookups only take `&self`, so one registry can be shared between threads
/// and reused for every decode and encode call.
#[derive(Debug)]
pub struct TypeTagRegistry {
    entries: Vec<(String, ElementType)>,
    by_discriminator: HashMap<String, usize>,
    by_type: HashMap<TypeId, usize>,
}

impl TypeTagRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds a registry from an ordered list of mappings.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::DuplicateDiscriminator`] or
    /// [`ConfigurationError::DuplicateType`] on the first repeat found.
    pub fn from_mappings<I, S>(mappings: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (S, ElementType)>,
        S: Into<String>,
    {
        let mappings = mappings.into_iter();
        let (capacity, _) = mappings.size_hint();

        let mut entries = Vec::with_capacity(capacity);
        let mut by_discriminator = HashMap::with_capacity(capacity);
        let mut by_type = HashMap::with_capacity(capacity);

        for (discriminator, element_type) in mappings {
            let discriminator: String = discriminator.into();
            let index = entries.len();

            if by_discriminator.contains_key(&discriminator) {
                return Err(ConfigurationError::DuplicateDiscriminator(discriminator));
            }
            if by_type.insert(element_type.type_id, index).is_some() {
                return Err(ConfigurationError::DuplicateType(element_type.type_name));
            }

            by_discriminator.insert(discriminator.clone(), index);
            entries.push((discriminator, element_type));
        }

        debug!(entries = entries.len(), "Built type tag registry");

        Ok(TypeTagRegistry {
            entries,
            by_discriminator,
            by_type,
        })
    }

    /// Resolves a discriminator to its element type.
    #[must_use]
    pub fn lookup(&self, discriminator: &str) -> Option<&ElementType> {
        self.by_discriminator
            .get(discriminator)
            .map(|&index| &self.entries[index].1)
    }

    /// Resolves an element type back to its discriminator.
    #[must_use]
    pub fn reverse_lookup(&self, type_id: TypeId) -> Option<&str> {
        self.by_type
            .get(&type_id)
            .map(|&index| self.entries[index].0.as_str())
    }

    /// Discriminator registered for `T`
    #[must_use]
    pub fn discriminator_for<T: Element>(&self) -> Option<&str> {
        self.reverse_lookup(TypeId::of::<T>())
    }

    /// Discriminator registered for the runtime type of `element`
    #[must_use]
    pub fn discriminator_of(&self, element: &dyn Element) -> Option<&str> {
        self.resolve(element).map(|(discriminator, _)| discriminator)
    }

    /// Discriminator and descriptor for the runtime type of `element`.
    ///
    /// Boxed elements that were boxed again resolve to their concrete type.
    pub(crate) fn resolve(&self, element: &dyn Element) -> Option<(&str, &ElementType)> {
        let type_id = element.concrete().as_any().type_id();
        self.by_type.get(&type_id).map(|&index| {
            let (discriminator, element_type) = &self.entries[index];
            (discriminator.as_str(), element_type)
        })
    }

    /// Like [`resolve`](Self::resolve), failing with
    /// [`SequenceError::UnknownType`] on a miss.
    pub(crate) fn require(&self, element: &dyn Element) -> Result<(&str, &ElementType)> {
        self.resolve(element).ok_or_else(|| {
            let type_name = element.concrete().type_name();
            warn!(type_name, "Unregistered element type");
            SequenceError::UnknownType(type_name)
        })
    }

    /// Number of registered mappings
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mappings in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ElementType)> {
        self.entries
            .iter()
            .map(|(discriminator, element_type)| (discriminator.as_str(), element_type))
    }
}
