//! # Shared codec types
//! - [`Element`]: the capability every payload type is viewed through
//! - [`TokenKind`]: the token vocabulary of the cursor and of decode errors

pub mod element;
pub mod token;

pub use element::*;
pub use token::*;
