//! Pull-based JSON token cursor
//!
//! [`JsonCursor`] walks a JSON document one token at a time without
//! building a tree. It validates structure as it goes (separators,
//! nesting, literals, string termination), but leaves the content of
//! strings and numbers to serde, which decodes any byte range the cursor
//! hands out.

use std::borrow::Cow;
use std::ops::Range;

use crate::error::{Result, SequenceError};
use crate::types::TokenKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Array,
    Object,
}

/// What the grammar allows at the current position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Top level, after `:`, or after `,` inside an array
    Value,
    /// Right after `[`
    ValueOrEnd,
    /// Right after `{`
    NameOrEnd,
    /// After `,` inside an object
    Name,
    /// After a complete value inside a container
    CommaOrEnd,
    /// The top-level value is complete
    Done,
}

/// A forward-only cursor over the tokens of a JSON document.
///
/// The cursor starts before the first token ([`TokenKind::None`]); every
/// call to [`read`](JsonCursor::read) moves it onto the next token.
#[derive(Debug)]
pub struct JsonCursor<'a> {
    input: &'a [u8],
    pos: usize,
    token: TokenKind,
    span: Range<usize>,
    stack: Vec<Container>,
    state: State,
}

impl<'a> JsonCursor<'a> {
    /// Creates a cursor positioned before the first token of `input`.
    #[must_use]
    pub fn new(input: &'a [u8]) -> Self {
        JsonCursor {
            input,
            pos: 0,
            token: TokenKind::None,
            span: 0..0,
            stack: Vec::new(),
            state: State::Value,
        }
    }

    /// The whole document this cursor reads from
    #[must_use]
    pub fn input(&self) -> &'a [u8] {
        self.input
    }

    /// Kind of the token the cursor sits on
    #[must_use]
    pub fn token_kind(&self) -> TokenKind {
        self.token
    }

    /// Byte range of the current token.
    ///
    /// For strings and property names the range includes the quotes.
    #[must_use]
    pub fn token_span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Byte offset just past the current token (and its `:` for property names)
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of containers currently open
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Advances to the next token and returns its kind.
    ///
    /// Returns [`TokenKind::None`] once the top-level value is complete and
    /// only whitespace remains.
    ///
    /// # Errors
    /// Fails with [`SequenceError::Syntax`] if the input is not well-formed JSON.
    pub fn read(&mut self) -> Result<TokenKind> {
        self.skip_whitespace();

        let Some(byte) = self.peek() else {
            if self.state == State::Done {
                self.token = TokenKind::None;
                self.span = self.pos..self.pos;
                return Ok(TokenKind::None);
            }
            return Err(SequenceError::syntax(self.pos, "unexpected end of input"));
        };

        match self.state {
            State::Done => Err(SequenceError::syntax(
                self.pos,
                "trailing characters after value",
            )),
            State::CommaOrEnd if byte == b',' => {
                self.pos += 1;
                self.state = match self.stack.last() {
                    Some(Container::Object) => State::Name,
                    _ => State::Value,
                };
                self.read()
            }
            State::CommaOrEnd => self.read_end(byte),
            State::NameOrEnd if byte == b'}' => self.read_end(byte),
            State::NameOrEnd | State::Name => self.read_name(byte),
            State::ValueOrEnd if byte == b']' => self.read_end(byte),
            State::ValueOrEnd | State::Value => self.read_value(byte),
        }
    }

    /// Decodes the current property name.
    ///
    /// Borrows from the input unless the name contains escape sequences.
    ///
    /// # Errors
    /// Fails with [`SequenceError::MalformedInput`] if the cursor is not on a
    /// property name, or [`SequenceError::Syntax`] if the name is not valid.
    pub fn property_name(&self) -> Result<Cow<'a, str>> {
        if self.token != TokenKind::PropertyName {
            return Err(SequenceError::malformed(
                TokenKind::PropertyName,
                self.token,
            ));
        }

        let input: &'a [u8] = self.input;
        let quoted = &input[self.span.clone()];
        let raw = &quoted[1..quoted.len() - 1];

        if raw.contains(&b'\\') {
            serde_json::from_slice::<String>(quoted)
                .map(Cow::Owned)
                .map_err(|_| SequenceError::syntax(self.span.start, "invalid escape sequence"))
        } else {
            std::str::from_utf8(raw)
                .map(Cow::Borrowed)
                .map_err(|_| SequenceError::syntax(self.span.start, "invalid UTF-8 in string"))
        }
    }

    /// Skips the current value and returns its byte range.
    ///
    /// On a start token this consumes everything up to and including the
    /// matching end token, counting nesting depth rather than tokens. On a
    /// property name the value that follows it is skipped. Scalars are
    /// already complete, so the cursor does not move.
    ///
    /// # Errors
    /// Propagates syntax errors met while skipping.
    pub fn skip(&mut self) -> Result<Range<usize>> {
        if self.token == TokenKind::PropertyName {
            self.read()?;
        }

        let start = self.span.start;

        if self.token.is_start() {
            let mut depth = 1usize;
            while depth > 0 {
                let kind = self.read()?;
                if kind.is_start() {
                    depth += 1;
                } else if kind.is_end() {
                    depth -= 1;
                }
            }
        }

        Ok(start..self.span.end)
    }

    /// Requires that nothing but whitespace follows the top-level value.
    ///
    /// # Errors
    /// Fails with [`SequenceError::Syntax`] if more tokens remain.
    pub fn finish(&mut self) -> Result<()> {
        match self.read()? {
            TokenKind::None => Ok(()),
            _ => Err(SequenceError::syntax(
                self.span.start,
                "trailing characters after value",
            )),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn after_value(&mut self) {
        self.state = if self.stack.is_empty() {
            State::Done
        } else {
            State::CommaOrEnd
        };
    }

    fn finish_token(&mut self, kind: TokenKind, start: usize) -> TokenKind {
        self.token = kind;
        self.span = start..self.pos;
        kind
    }

    fn read_end(&mut self, byte: u8) -> Result<TokenKind> {
        let kind = match (byte, self.stack.last()) {
            (b']', Some(Container::Array)) => TokenKind::EndArray,
            (b'}', Some(Container::Object)) => TokenKind::EndObject,
            _ => {
                return Err(SequenceError::syntax(
                    self.pos,
                    "expected `,` or closing bracket",
                ));
            }
        };

        self.stack.pop();
        let start = self.pos;
        self.pos += 1;
        self.after_value();

        Ok(self.finish_token(kind, start))
    }

    fn read_name(&mut self, byte: u8) -> Result<TokenKind> {
        if byte != b'"' {
            return Err(SequenceError::syntax(self.pos, "expected property name"));
        }

        let start = self.pos;
        self.scan_string()?;
        let end = self.pos;

        self.skip_whitespace();
        if self.peek() != Some(b':') {
            return Err(SequenceError::syntax(
                self.pos,
                "expected `:` after property name",
            ));
        }
        self.pos += 1;
        self.state = State::Value;

        self.token = TokenKind::PropertyName;
        self.span = start..end;
        Ok(TokenKind::PropertyName)
    }

    fn read_value(&mut self, byte: u8) -> Result<TokenKind> {
        let start = self.pos;

        let kind = match byte {
            b'{' => {
                self.pos += 1;
                self.stack.push(Container::Object);
                self.state = State::NameOrEnd;
                return Ok(self.finish_token(TokenKind::StartObject, start));
            }
            b'[' => {
                self.pos += 1;
                self.stack.push(Container::Array);
                self.state = State::ValueOrEnd;
                return Ok(self.finish_token(TokenKind::StartArray, start));
            }
            b'"' => {
                self.scan_string()?;
                TokenKind::String
            }
            b'-' | b'0'..=b'9' => {
                self.scan_number()?;
                TokenKind::Number
            }
            b't' => {
                self.scan_literal(b"true")?;
                TokenKind::Boolean
            }
            b'f' => {
                self.scan_literal(b"false")?;
                TokenKind::Boolean
            }
            b'n' => {
                self.scan_literal(b"null")?;
                TokenKind::Null
            }
            _ => return Err(SequenceError::syntax(self.pos, "expected value")),
        };

        self.after_value();
        Ok(self.finish_token(kind, start))
    }

    fn scan_string(&mut self) -> Result<()> {
        let start = self.pos;
        self.pos += 1;

        loop {
            match self.peek() {
                None => return Err(SequenceError::syntax(start, "unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'\\') => self.pos += 2,
                Some(0x00..=0x1f) => {
                    return Err(SequenceError::syntax(
                        self.pos,
                        "control character in string",
                    ));
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn scan_number(&mut self) -> Result<()> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }

        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => self.skip_digits(),
            _ => return Err(SequenceError::syntax(self.pos, "invalid number")),
        }

        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.expect_digits()?;
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            self.expect_digits()?;
        }

        Ok(())
    }

    fn skip_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
    }

    fn expect_digits(&mut self) -> Result<()> {
        if !matches!(self.peek(), Some(b'0'..=b'9')) {
            return Err(SequenceError::syntax(self.pos, "invalid number"));
        }
        self.skip_digits();
        Ok(())
    }

    fn scan_literal(&mut self, literal: &'static [u8]) -> Result<()> {
        if self.input[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(())
        } else {
            Err(SequenceError::syntax(self.pos, "invalid literal"))
        }
    }
}
