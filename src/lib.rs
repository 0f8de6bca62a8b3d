#![warn(clippy::pedantic, missing_docs)]
#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

//! ## ⚠️ Registries are frozen
//! A [`registry::TypeTagRegistry`] can only be created through its
//! builder, which rejects duplicate discriminators and duplicate types.
//! Once built it cannot be changed; build a new one instead.

pub mod codecs;
pub mod cursor;
pub mod error;
pub mod list;
pub mod registry;
pub mod types;
pub mod writer;

pub use codecs::SequenceCodec;
pub use error::{ConfigurationError, SequenceError};
pub use list::{ElementKinds, TaggedList};
pub use registry::{ElementType, RegistryBuilder, TypeTagRegistry};
