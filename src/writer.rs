//! Token-level JSON writer, the encoding counterpart of [`JsonCursor`](crate::cursor::JsonCursor)

use std::io::Write;

use crate::error::Result;

/// Writes JSON one structural token at a time.
///
/// Separators (`,` and `:`) are inserted automatically. The writer does not
/// check that starts and ends are balanced; that is up to the caller.
#[derive(Debug)]
pub struct JsonWriter<W> {
    inner: W,
    // One entry per open container, `true` once it holds an item
    open: Vec<bool>,
    after_name: bool,
}

impl<W: Write> JsonWriter<W> {
    /// Wraps a sink.
    pub fn new(inner: W) -> Self {
        JsonWriter {
            inner,
            open: Vec::new(),
            after_name: false,
        }
    }

    /// Writes `[`.
    ///
    /// # Errors
    /// Fails if the sink does.
    pub fn write_start_array(&mut self) -> Result<()> {
        self.begin_value()?;
        self.inner.write_all(b"[")?;
        self.open.push(false);
        Ok(())
    }

    /// Writes `]`.
    ///
    /// # Errors
    /// Fails if the sink does.
    pub fn write_end_array(&mut self) -> Result<()> {
        self.open.pop();
        self.inner.write_all(b"]")?;
        Ok(())
    }

    /// Writes `{`.
    ///
    /// # Errors
    /// Fails if the sink does.
    pub fn write_start_object(&mut self) -> Result<()> {
        self.begin_value()?;
        self.inner.write_all(b"{")?;
        self.open.push(false);
        Ok(())
    }

    /// Writes `}`.
    ///
    /// # Errors
    /// Fails if the sink does.
    pub fn write_end_object(&mut self) -> Result<()> {
        self.open.pop();
        self.inner.write_all(b"}")?;
        Ok(())
    }

    /// Writes a quoted, escaped property name followed by `:`.
    ///
    /// # Errors
    /// Fails if the sink does.
    pub fn write_property_name(&mut self, name: &str) -> Result<()> {
        self.separate()?;
        serde_json::to_writer(&mut self.inner, name).map_err(std::io::Error::from)?;
        self.inner.write_all(b":")?;
        self.after_name = true;
        Ok(())
    }

    /// Writes one complete value produced by `write`.
    ///
    /// The closure receives the raw sink and must emit exactly one JSON value.
    ///
    /// # Errors
    /// Fails if the sink or `write` does.
    pub fn write_value<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        self.begin_value()?;
        write(&mut self.inner)
    }

    /// Flushes the sink.
    ///
    /// # Errors
    /// Fails if the sink does.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Returns the sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn begin_value(&mut self) -> Result<()> {
        if self.after_name {
            self.after_name = false;
            return Ok(());
        }
        self.separate()
    }

    fn separate(&mut self) -> Result<()> {
        if let Some(has_items) = self.open.last_mut() {
            if *has_items {
                self.inner.write_all(b",")?;
            }
            *has_items = true;
        }
        Ok(())
    }
}
