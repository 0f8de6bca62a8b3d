//! # Tagged sequence codec
//!
//! ## Wire format
//! A sequence is a JSON array in which every element is wrapped in an
//! envelope, an object with exactly one property. The property name is the
//! element's discriminator and its value is the element's payload object:
//!
//! ```text
//! [{"video": {"id": "sm9"}}, {"thread": {"fork": "owner"}}]
//! ```
//!
//! ## What does the codec do?
//! [`SequenceCodec`] walks the envelopes token by token, resolves each
//! discriminator through a [`TypeTagRegistry`], and hands the payload to
//! serde for the concrete type. Encoding is the mirror image.

use std::io::Write;

use tracing::{debug, trace, warn};

use crate::{
    cursor::JsonCursor,
    error::{Result, SequenceError},
    registry::TypeTagRegistry,
    types::{Element, Sequence, TokenKind},
    writer::JsonWriter,
};

fn expect(expected: TokenKind, actual: TokenKind) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SequenceError::malformed(expected, actual))
    }
}

/// Decodes and encodes tagged sequences against one registry
#[derive(Clone, Copy, Debug)]
pub struct SequenceCodec<'r> {
    registry: &'r TypeTagRegistry,
}

impl<'r> SequenceCodec<'r> {
    /// Creates a codec backed by `registry`.
    #[must_use]
    pub const fn new(registry: &'r TypeTagRegistry) -> Self {
        SequenceCodec { registry }
    }

    /// The registry this codec resolves discriminators with
    #[must_use]
    pub const fn registry(&self) -> &'r TypeTagRegistry {
        self.registry
    }

    /// Decodes the array the cursor currently sits on.
    ///
    /// The cursor must be on [`TokenKind::StartArray`]. On success it is
    /// left on the matching [`TokenKind::EndArray`], so the next
    /// [`read`](JsonCursor::read) continues right after the sequence.
    ///
    /// # Errors
    /// - [`SequenceError::MalformedInput`] when the array or an envelope is
    ///   not shaped as expected, including envelopes with more than one
    ///   property
    /// - [`SequenceError::UnknownDiscriminator`] when a tag is not registered
    /// - [`SequenceError::Payload`] when serde rejects a payload
    /// - [`SequenceError::Syntax`] when the input is not valid JSON
    ///
    /// Nothing is returned on error; elements decoded so far are dropped.
    pub fn decode(&self, cursor: &mut JsonCursor<'_>) -> Result<Sequence> {
        expect(TokenKind::StartArray, cursor.token_kind())?;

        let mut items: Sequence = Vec::new();

        loop {
            match cursor.read()? {
                TokenKind::StartObject => {}
                TokenKind::EndArray => break,
                actual => return Err(SequenceError::malformed(TokenKind::EndArray, actual)),
            }

            expect(TokenKind::PropertyName, cursor.read()?)?;
            let discriminator = cursor.property_name()?;

            expect(TokenKind::StartObject, cursor.read()?)?;

            let Some(element_type) = self.registry.lookup(&discriminator) else {
                warn!(%discriminator, index = items.len(), "Unknown discriminator");
                return Err(SequenceError::UnknownDiscriminator(
                    discriminator.into_owned(),
                ));
            };

            let payload = cursor.skip()?;
            trace!(%discriminator, index = items.len(), "Decoding element");
            items.push(element_type.decode(&cursor.input()[payload])?);

            expect(TokenKind::EndObject, cursor.read()?)?;
        }

        debug!(len = items.len(), "Decoded tagged sequence");

        Ok(items)
    }

    /// Decodes a complete document consisting of one tagged sequence.
    ///
    /// # Errors
    /// Same as [`decode`](Self::decode), plus [`SequenceError::Syntax`] if
    /// anything but whitespace follows the array.
    pub fn decode_slice(&self, input: &[u8]) -> Result<Sequence> {
        let mut cursor = JsonCursor::new(input);
        cursor.read()?;
        let items = self.decode(&mut cursor)?;
        cursor.finish()?;
        Ok(items)
    }

    /// String counterpart of [`decode_slice`](Self::decode_slice)
    ///
    /// # Errors
    /// See [`decode_slice`](Self::decode_slice).
    pub fn decode_str(&self, input: &str) -> Result<Sequence> {
        self.decode_slice(input.as_bytes())
    }

    /// Writes `items` as a tagged sequence.
    ///
    /// # Errors
    /// - [`SequenceError::UnknownType`] when an element's runtime type is
    ///   not registered
    /// - [`SequenceError::NonObjectPayload`] when an element does not
    ///   serialize to an object
    /// - [`SequenceError::Payload`] when serde fails on a payload
    /// - [`SequenceError::Io`] when the sink fails
    ///
    /// On error the writer may hold a partial sequence and must be
    /// discarded.
    pub fn encode<W: Write>(
        &self,
        writer: &mut JsonWriter<W>,
        items: &[Box<dyn Element>],
    ) -> Result<()> {
        writer.write_start_array()?;

        for (index, item) in items.iter().enumerate() {
            let item: &dyn Element = &**item;

            let (discriminator, element_type) = self.registry.require(item)?;

            trace!(discriminator, index, "Encoding element");

            writer.write_start_object()?;
            writer.write_property_name(discriminator)?;
            writer.write_value(|out| element_type.encode(item, out))?;
            writer.write_end_object()?;
        }

        writer.write_end_array()?;

        debug!(len = items.len(), "Encoded tagged sequence");

        Ok(())
    }

    /// Encodes `items` into a new buffer.
    ///
    /// Only a fully encoded sequence is ever returned.
    ///
    /// # Errors
    /// See [`encode`](Self::encode).
    pub fn encode_to_vec(&self, items: &[Box<dyn Element>]) -> Result<Vec<u8>> {
        let mut writer = JsonWriter::new(Vec::new());
        self.encode(&mut writer, items)?;
        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Video {
        id: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Thread {
        fork: String,
        #[serde(default)]
        layers: Vec<Vec<u32>>,
    }

    #[derive(Debug)]
    struct Unregistered;

    #[derive(Debug, Serialize, Deserialize)]
    struct Count(u32);

    fn registry() -> TypeTagRegistry {
        TypeTagRegistry::builder()
            .register::<Video>("x")
            .register::<Thread>("y")
            .build()
            .unwrap()
    }

    #[test]
    fn decodes_in_order() {
        let registry = registry();
        let items = SequenceCodec::new(&registry)
            .decode_str(r#"[{"x":{"id":"sm9"}},{"y":{"fork":"owner"}},{"x":{"id":"so1"}}]"#)
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0].downcast_ref::<Video>(),
            Some(&Video { id: "sm9".into() })
        );
        assert!(items[1].is::<Thread>());
        assert_eq!(
            items[2].downcast_ref::<Video>(),
            Some(&Video { id: "so1".into() })
        );
    }

    #[test]
    fn empty_array() {
        let registry = registry();
        let codec = SequenceCodec::new(&registry);

        assert!(codec.decode_str(" [ ] ").unwrap().is_empty());
        assert_eq!(codec.encode_to_vec(&[]).unwrap(), b"[]");
    }

    #[test]
    fn unknown_discriminator() {
        let registry = registry();
        let result = SequenceCodec::new(&registry).decode_str(r#"[{"unknown":{}}]"#);
        assert!(matches!(
            result,
            Err(SequenceError::UnknownDiscriminator(tag)) if tag == "unknown"
        ));
    }

    #[test]
    fn non_object_payload() {
        let registry = registry();
        let result = SequenceCodec::new(&registry).decode_str(r#"[{"a":1}]"#);
        assert!(matches!(
            result,
            Err(SequenceError::MalformedInput {
                expected: TokenKind::StartObject,
                actual: TokenKind::Number,
            })
        ));
    }

    #[test]
    fn structural_checkpoints() {
        let registry = registry();
        let codec = SequenceCodec::new(&registry);

        let cases = [
            (r#"{"x":{}}"#, TokenKind::StartArray, TokenKind::StartObject),
            (r#"[{}]"#, TokenKind::PropertyName, TokenKind::EndObject),
            (r#"[[]]"#, TokenKind::EndArray, TokenKind::StartArray),
            (r#"["x"]"#, TokenKind::EndArray, TokenKind::String),
            (
                r#"[{"x":{"id":"a"},"y":{"fork":"b"}}]"#,
                TokenKind::EndObject,
                TokenKind::PropertyName,
            ),
        ];

        for (input, expected, actual) in cases {
            match codec.decode_str(input) {
                Err(SequenceError::MalformedInput {
                    expected: e,
                    actual: a,
                }) => assert_eq!((e, a), (expected, actual), "{input}"),
                other => panic!("{input}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn nested_payloads_are_skipped_by_depth() {
        let registry = registry();
        let items = SequenceCodec::new(&registry)
            .decode_str(r#"[{"y":{"layers":[[1,2],[],[3]],"fork":"}]"}},{"x":{"id":"z"}}]"#)
            .unwrap();

        assert_eq!(
            items[0].downcast_ref::<Thread>(),
            Some(&Thread {
                fork: "}]".into(),
                layers: vec![vec![1, 2], vec![], vec![3]],
            })
        );
        assert!(items[1].is::<Video>());
    }

    #[test]
    fn payload_errors_pass_through() {
        let registry = registry();
        let result = SequenceCodec::new(&registry).decode_str(r#"[{"x":{"id":5}}]"#);
        assert!(matches!(result, Err(SequenceError::Payload(_))));
    }

    #[test]
    fn cursor_stops_on_end_array() {
        let registry = registry();
        let input = br#"{"items":[{"x":{"id":"a"}}],"next":null}"#;
        let mut cursor = JsonCursor::new(input);

        assert_eq!(cursor.read().unwrap(), TokenKind::StartObject);
        assert_eq!(cursor.read().unwrap(), TokenKind::PropertyName);
        assert_eq!(cursor.read().unwrap(), TokenKind::StartArray);

        let items = SequenceCodec::new(&registry).decode(&mut cursor).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(cursor.token_kind(), TokenKind::EndArray);

        assert_eq!(cursor.read().unwrap(), TokenKind::PropertyName);
        assert_eq!(cursor.property_name().unwrap(), "next");
    }

    #[test]
    fn encodes_envelopes() {
        let registry = registry();
        let items: Sequence = vec![
            Box::new(Thread {
                fork: "main".into(),
                layers: vec![],
            }),
            Box::new(Video { id: "sm9".into() }),
        ];

        let bytes = SequenceCodec::new(&registry).encode_to_vec(&items).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"y":{"fork":"main","layers":[]}},{"x":{"id":"sm9"}}]"#
        );
    }

    #[test]
    fn unregistered_type() {
        let registry = registry();
        let items: Sequence = vec![Box::new(Video { id: "a".into() }), Box::new(Unregistered)];

        let result = SequenceCodec::new(&registry).encode_to_vec(&items);
        assert!(matches!(
            result,
            Err(SequenceError::UnknownType(name)) if name.ends_with("Unregistered")
        ));
    }

    #[test]
    fn escaped_discriminator() {
        let registry = registry();
        let items = SequenceCodec::new(&registry)
            .decode_str(r#"[{"\u0078":{"id":"a"}},{"\u0079":{"fork":"b"}}]"#)
            .unwrap();

        assert_eq!(
            items[0].downcast_ref::<Video>(),
            Some(&Video { id: "a".into() })
        );
        assert!(items[1].is::<Thread>());
    }

    #[test]
    fn non_object_payload_is_not_encoded() {
        let registry = TypeTagRegistry::builder()
            .register::<Count>("c")
            .build()
            .unwrap();
        let codec = SequenceCodec::new(&registry);
        let items: Sequence = vec![Box::new(Count(5))];

        assert!(matches!(
            codec.encode_to_vec(&items),
            Err(SequenceError::NonObjectPayload {
                actual: TokenKind::Number,
                ..
            })
        ));
    }

    #[test]
    fn nested_boxes_encode_as_their_element() {
        let registry = registry();
        let inner: Box<dyn Element> = Box::new(Video { id: "sm9".into() });
        let items: Sequence = vec![Box::new(inner)];

        let bytes = SequenceCodec::new(&registry).encode_to_vec(&items).unwrap();
        assert_eq!(bytes, br#"[{"x":{"id":"sm9"}}]"#);
    }
}
