//! Token kinds produced by [`JsonCursor`](crate::cursor::JsonCursor)

use std::fmt::Display;

use serde_json::Value;

/// The kind of the token a cursor currently sits on.
///
/// Used both by the cursor itself and by
/// [`SequenceError::MalformedInput`](crate::error::SequenceError::MalformedInput)
/// to report what the decoder expected versus what it found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// No token has been read yet, or the input is exhausted
    None,
    /// `[`
    StartArray,
    /// `]`
    EndArray,
    /// `{`
    StartObject,
    /// `}`
    EndObject,
    /// A string in key position, its `:` already consumed
    PropertyName,
    /// A string in value position
    String,
    /// Any JSON number
    Number,
    /// `true` or `false`
    Boolean,
    /// `null`
    Null,
}

impl TokenKind {
    /// Returns `true` for tokens that open a nested container.
    #[must_use]
    pub const fn is_start(self) -> bool {
        matches!(self, TokenKind::StartArray | TokenKind::StartObject)
    }

    /// Returns `true` for tokens that close a nested container.
    #[must_use]
    pub const fn is_end(self) -> bool {
        matches!(self, TokenKind::EndArray | TokenKind::EndObject)
    }

    /// Kind of the first token of a serialized JSON value starting with `byte`
    pub(crate) fn of_leading_byte(byte: Option<&u8>) -> Self {
        match byte {
            None => TokenKind::None,
            Some(b'{') => TokenKind::StartObject,
            Some(b'[') => TokenKind::StartArray,
            Some(b'"') => TokenKind::String,
            Some(b't' | b'f') => TokenKind::Boolean,
            Some(b'n') => TokenKind::Null,
            Some(_) => TokenKind::Number,
        }
    }

    /// Kind of the first token `value` serializes to
    pub(crate) fn of_value(value: &Value) -> Self {
        match value {
            Value::Object(_) => TokenKind::StartObject,
            Value::Array(_) => TokenKind::StartArray,
            Value::String(_) => TokenKind::String,
            Value::Number(_) => TokenKind::Number,
            Value::Bool(_) => TokenKind::Boolean,
            Value::Null => TokenKind::Null,
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let to_write = match self {
            TokenKind::None => "none",
            TokenKind::StartArray => "start of array",
            TokenKind::EndArray => "end of array",
            TokenKind::StartObject => "start of object",
            TokenKind::EndObject => "end of object",
            TokenKind::PropertyName => "property name",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Boolean => "boolean",
            TokenKind::Null => "null",
        };

        f.write_str(to_write)
    }
}
