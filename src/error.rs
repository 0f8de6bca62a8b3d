//! Error types for registry construction, decoding and encoding

use thiserror::Error;

use crate::types::TokenKind;

/// Result type for sequence codec operations.
pub type Result<T, E = SequenceError> = std::result::Result<T, E>;

/// Raised while building a [`TypeTagRegistry`](crate::registry::TypeTagRegistry).
///
/// A registry that fails to build is never handed out, so this error is
/// only ever seen once, at construction time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Two mappings share the same discriminator
    #[error("discriminator `{0}` is registered more than once")]
    DuplicateDiscriminator(String),

    /// Two mappings share the same element type
    #[error("element type `{0}` is registered more than once")]
    DuplicateType(&'static str),
}

/// Errors produced by [`SequenceCodec`](crate::codecs::SequenceCodec) and the token layer.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// The registry could not be built
    #[error("invalid registry: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A structural checkpoint of the envelope protocol did not hold.
    #[error("malformed input: expected {expected}, found {actual}")]
    MalformedInput {
        /// What the envelope protocol required at this point
        expected: TokenKind,
        /// What the cursor actually sat on
        actual: TokenKind,
    },

    /// An envelope carried a discriminator that is not registered
    #[error("unknown discriminator `{0}`")]
    UnknownDiscriminator(String),

    /// An element's runtime type is not registered
    #[error("unregistered element type `{0}`")]
    UnknownType(&'static str),

    /// A registered type serialized to something other than a JSON object,
    /// which could not be decoded again.
    #[error("payload of `{type_name}` must serialize to an object, found {actual}")]
    NonObjectPayload {
        /// Name of the offending element type
        type_name: &'static str,
        /// What the payload started with instead
        actual: TokenKind,
    },

    /// Error returned by serde while handling a payload.
    #[error(transparent)]
    Payload(#[from] serde_json::Error),

    /// The input is not well-formed JSON
    #[error("invalid JSON at byte {offset}: {reason}")]
    Syntax {
        /// Byte offset into the input
        offset: usize,
        /// Short description of the problem
        reason: &'static str,
    },

    /// The output sink failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SequenceError {
    pub(crate) const fn malformed(expected: TokenKind, actual: TokenKind) -> Self {
        SequenceError::MalformedInput { expected, actual }
    }

    pub(crate) const fn syntax(offset: usize, reason: &'static str) -> Self {
        SequenceError::Syntax { offset, reason }
    }
}
