//! Tagged sequences as fields of larger serde models
//!
//! Response and request models of the surrounding client embed tagged
//! sequences as ordinary struct fields. [`TaggedList`] makes that possible:
//! it (de)serializes as an array of single-key envelopes using the registry
//! of its list kind `K`, which is built once and then shared.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tagseq::{list::TaggedList, tagged_list};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Dmc {
//!     url: String,
//! }
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Hls {
//!     url: String,
//! }
//!
//! tagged_list! {
//!     /// Delivery options of a video
//!     pub struct DeliveryKinds {
//!         "dmc" => Dmc,
//!         "hls" => Hls,
//!     }
//! }
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct WatchData {
//!     title: String,
//!     delivery: TaggedList<DeliveryKinds>,
//! }
//!
//! let data: WatchData = serde_json::from_str(
//!     r#"{"title":"demo","delivery":[{"hls":{"url":"https://example.com/a.m3u8"}}]}"#,
//! )
//! .unwrap();
//! assert!(data.delivery[0].is::<Hls>());
//! ```
//!
//! The serde impls only use serde's data model, so the field works with
//! any self-describing format (JSON, MessagePack, ...). Payloads pass
//! through [`serde_json::Value`] on their way to and from the concrete type.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor},
    ser::{self, SerializeMap, SerializeSeq},
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    codecs::SequenceCodec,
    error::{ConfigurationError, SequenceError},
    registry::TypeTagRegistry,
    types::{Element, Sequence, TokenKind, element::unnest},
};

/// A family of element types sharing one registry.
///
/// Usually declared with [`tagged_list!`](crate::tagged_list).
pub trait ElementKinds: 'static {
    /// Returns the registry for this list kind, building it on first use.
    ///
    /// # Errors
    /// Returns the construction error if the mappings are not a bijection.
    fn registry() -> Result<&'static TypeTagRegistry, ConfigurationError>;
}

/// Declares a list kind from `"discriminator" => Type` pairs.
///
/// The generated unit struct implements [`ElementKinds`]; its registry is
/// built on first use and cached for the lifetime of the process.
#[macro_export]
macro_rules! tagged_list {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $tag:literal => $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default)]
        $vis struct $name;

        impl $crate::list::ElementKinds for $name {
            fn registry() -> ::std::result::Result<
                &'static $crate::registry::TypeTagRegistry,
                $crate::error::ConfigurationError,
            > {
                static REGISTRY: ::std::sync::OnceLock<
                    ::std::result::Result<
                        $crate::registry::TypeTagRegistry,
                        $crate::error::ConfigurationError,
                    >,
                > = ::std::sync::OnceLock::new();

                REGISTRY
                    .get_or_init(|| {
                        $crate::registry::TypeTagRegistry::builder()
                            $( .register::<$ty>($tag) )*
                            .build()
                    })
                    .as_ref()
                    .map_err(::std::clone::Clone::clone)
            }
        }
    };
}

/// A tagged sequence whose element types are given by `K`
pub struct TaggedList<K> {
    items: Sequence,
    _kinds: PhantomData<fn() -> K>,
}

impl<K> TaggedList<K> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Appends an element.
    ///
    /// The element's type is only checked against the registry when the
    /// list is serialized. Elements taken out of another list may be pushed
    /// as they are; they are not boxed a second time.
    pub fn push<T: Element>(&mut self, item: T) {
        self.push_boxed(Box::new(item));
    }

    /// Appends an already boxed element.
    pub fn push_boxed(&mut self, item: Box<dyn Element>) {
        self.items.push(unnest(item));
    }

    /// Returns the elements in order.
    #[must_use]
    pub fn into_inner(self) -> Sequence {
        self.items
    }
}

impl<K: ElementKinds> TaggedList<K> {
    /// Decodes a standalone JSON document holding one tagged sequence.
    ///
    /// # Errors
    /// Fails if the registry cannot be built or the input does not decode.
    pub fn from_slice(input: &[u8]) -> crate::error::Result<Self> {
        let items = SequenceCodec::new(K::registry()?).decode_slice(input)?;
        Ok(Self::from(items))
    }

    /// Encodes the list as a standalone JSON document.
    ///
    /// # Errors
    /// Fails if the registry cannot be built or an element does not encode.
    pub fn to_vec(&self) -> crate::error::Result<Vec<u8>> {
        SequenceCodec::new(K::registry()?).encode_to_vec(&self.items)
    }
}

impl<K> Default for TaggedList<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Debug for TaggedList<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<K> From<Sequence> for TaggedList<K> {
    fn from(items: Sequence) -> Self {
        TaggedList {
            items,
            _kinds: PhantomData,
        }
    }
}

impl<K> From<TaggedList<K>> for Sequence {
    fn from(list: TaggedList<K>) -> Self {
        list.items
    }
}

impl<K> Deref for TaggedList<K> {
    type Target = Sequence;

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<K> DerefMut for TaggedList<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

impl<K> FromIterator<Box<dyn Element>> for TaggedList<K> {
    fn from_iter<I: IntoIterator<Item = Box<dyn Element>>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<K> Extend<Box<dyn Element>> for TaggedList<K> {
    fn extend<I: IntoIterator<Item = Box<dyn Element>>>(&mut self, iter: I) {
        for item in iter {
            self.push_boxed(item);
        }
    }
}

impl<K> IntoIterator for TaggedList<K> {
    type Item = Box<dyn Element>;
    type IntoIter = std::vec::IntoIter<Box<dyn Element>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, K> IntoIterator for &'a TaggedList<K> {
    type Item = &'a Box<dyn Element>;
    type IntoIter = std::slice::Iter<'a, Box<dyn Element>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// One `{"<discriminator>": {<payload>}}` envelope
struct Envelope<'a> {
    discriminator: &'a str,
    payload: &'a Value,
}

impl Serialize for Envelope<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.discriminator, self.payload)?;
        map.end()
    }
}

impl<K: ElementKinds> Serialize for TaggedList<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let registry = K::registry().map_err(<S::Error as ser::Error>::custom)?;

        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            let item: &dyn Element = &**item;
            let (discriminator, element_type) = registry
                .require(item)
                .map_err(<S::Error as ser::Error>::custom)?;
            let payload = element_type
                .to_value(item)
                .map_err(<S::Error as ser::Error>::custom)?;

            seq.serialize_element(&Envelope {
                discriminator,
                payload: &payload,
            })?;
        }

        debug!(len = self.items.len(), "Serialized tagged list");
        seq.end()
    }
}

/// Reads the outer array
struct SequenceVisitor<'r> {
    registry: &'r TypeTagRegistry,
}

impl<'de> Visitor<'de> for SequenceVisitor<'_> {
    type Value = Sequence;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence of single-key envelope maps")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Sequence, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(EnvelopeSeed {
            registry: self.registry,
        })? {
            items.push(item);
        }

        debug!(len = items.len(), "Deserialized tagged list");
        Ok(items)
    }
}

/// Reads one envelope
struct EnvelopeSeed<'r> {
    registry: &'r TypeTagRegistry,
}

impl<'de> DeserializeSeed<'de> for EnvelopeSeed<'_> {
    type Value = Box<dyn Element>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for EnvelopeSeed<'_> {
    type Value = Box<dyn Element>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map with exactly one entry")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let Some(discriminator) = map.next_key::<String>()? else {
            return Err(de::Error::custom(SequenceError::malformed(
                TokenKind::PropertyName,
                TokenKind::EndObject,
            )));
        };

        let payload: Value = map.next_value()?;
        if !payload.is_object() {
            return Err(de::Error::custom(SequenceError::malformed(
                TokenKind::StartObject,
                TokenKind::of_value(&payload),
            )));
        }

        let Some(element_type) = self.registry.lookup(&discriminator) else {
            warn!(%discriminator, "Unknown discriminator");
            return Err(de::Error::custom(SequenceError::UnknownDiscriminator(
                discriminator,
            )));
        };

        if map.next_key::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(SequenceError::malformed(
                TokenKind::EndObject,
                TokenKind::PropertyName,
            )));
        }

        element_type.from_value(payload).map_err(de::Error::custom)
    }
}

impl<'de, K: ElementKinds> Deserialize<'de> for TaggedList<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let registry = K::registry().map_err(<D::Error as de::Error>::custom)?;
        let items = deserializer.deserialize_seq(SequenceVisitor { registry })?;
        Ok(Self::from(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dmc {
        url: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Hls {
        url: String,
    }

    tagged_list! {
        struct Delivery {
            "dmc" => Dmc,
            "hls" => Hls,
        }
    }

    tagged_list! {
        struct Broken {
            "dmc" => Dmc,
            "dmc" => Hls,
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Media {
        id: String,
        delivery: TaggedList<Delivery>,
    }

    #[test]
    fn registry_is_built_once() {
        let first = Delivery::registry().unwrap();
        let second = Delivery::registry().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn broken_kinds_report_configuration_error() {
        assert_eq!(
            Broken::registry().unwrap_err(),
            ConfigurationError::DuplicateDiscriminator("dmc".to_string())
        );
        assert!(TaggedList::<Broken>::from_slice(b"[]").is_err());
    }

    #[test]
    fn embedded_field_round_trip() {
        let mut delivery = TaggedList::<Delivery>::new();
        delivery.push(Hls { url: "h".into() });
        delivery.push(Dmc { url: "d".into() });

        let media = Media {
            id: "sm9".into(),
            delivery,
        };

        let json = serde_json::to_string(&media).unwrap();
        assert_eq!(
            json,
            r#"{"id":"sm9","delivery":[{"hls":{"url":"h"}},{"dmc":{"url":"d"}}]}"#
        );

        let back: Media = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "sm9");
        assert_eq!(back.delivery.len(), 2);
        assert_eq!(
            back.delivery[0].downcast_ref::<Hls>(),
            Some(&Hls { url: "h".into() })
        );
        assert_eq!(
            back.delivery[1].downcast_ref::<Dmc>(),
            Some(&Dmc { url: "d".into() })
        );
    }

    #[test]
    fn embedded_field_reports_unknown_tag() {
        let err = serde_json::from_str::<Media>(r#"{"id":"a","delivery":[{"rtmp":{}}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown discriminator `rtmp`"));
    }

    #[test]
    fn serializing_unregistered_element_fails() {
        let mut delivery = TaggedList::<Delivery>::new();
        delivery.push(42u32);
        assert!(serde_json::to_string(&delivery).is_err());
    }

    #[test]
    fn elements_move_between_lists() {
        let mut source = TaggedList::<Delivery>::new();
        source.push(Dmc { url: "d".into() });
        source.push(Hls { url: "h".into() });
        let mut more = TaggedList::<Delivery>::new();
        more.push(Hls { url: "h2".into() });

        let mut target = TaggedList::<Delivery>::new();
        for item in source {
            target.push(item);
        }
        target.extend(more);

        assert_eq!(target.len(), 3);
        assert!(target[0].is::<Dmc>());
        assert!((*target[1]).as_any().is::<Hls>());
        assert!((*target[2]).as_any().is::<Hls>());
        assert_eq!(
            target.to_vec().unwrap(),
            br#"[{"dmc":{"url":"d"}},{"hls":{"url":"h"}},{"hls":{"url":"h2"}}]"#
        );

        let collected: TaggedList<Delivery> = target.into_iter().collect();
        assert_eq!(collected.len(), 3);
        assert!((*collected[0]).as_any().is::<Dmc>());
    }

    #[test]
    fn embedded_field_round_trips_through_message_pack() {
        let mut delivery = TaggedList::<Delivery>::new();
        delivery.push(Dmc { url: "d".into() });
        delivery.push(Hls { url: "h".into() });
        let media = Media {
            id: "sm9".into(),
            delivery,
        };

        let bytes = rmp_serde::to_vec_named(&media).unwrap();
        let back: Media = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(back.id, "sm9");
        assert_eq!(back.delivery.len(), 2);
        assert_eq!(
            back.delivery[0].downcast_ref::<Dmc>(),
            Some(&Dmc { url: "d".into() })
        );
        assert_eq!(
            back.delivery[1].downcast_ref::<Hls>(),
            Some(&Hls { url: "h".into() })
        );
    }

    #[test]
    fn embedded_field_rejects_malformed_envelopes() {
        let scalar = serde_json::from_str::<TaggedList<Delivery>>(r#"[{"dmc":1}]"#).unwrap_err();
        assert!(scalar.to_string().contains("malformed input"));

        let extra =
            serde_json::from_str::<TaggedList<Delivery>>(r#"[{"dmc":{"url":"d"},"hls":{}}]"#)
                .unwrap_err();
        assert!(extra.to_string().contains("malformed input"));

        let empty = serde_json::from_str::<TaggedList<Delivery>>(r"[{}]").unwrap_err();
        assert!(empty.to_string().contains("malformed input"));

        assert!(serde_json::from_str::<TaggedList<Delivery>>(r#"{"dmc":{}}"#).is_err());
    }
}
