//! The capability shared by every element of a tagged sequence

use std::any::Any;
use std::fmt::Debug;

/// A concrete payload type viewed through the common element capability.
///
/// This is implemented for every `'static` type that is `Debug + Send + Sync`,
/// so integrators never implement it by hand. Whether a type can actually be
/// carried in a sequence is decided by registering it in a
/// [`TypeTagRegistry`](crate::registry::TypeTagRegistry).
pub trait Element: Any + Debug + Send + Sync {
    /// Upcast used for runtime type resolution and downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutable counterpart of [`Element::as_any`]
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Name of the concrete type, for diagnostics only
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Debug + Send + Sync> Element for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl dyn Element {
    /// Returns `true` if the concrete type behind this element is `T`.
    #[must_use]
    pub fn is<T: Element>(&self) -> bool {
        self.concrete().as_any().is::<T>()
    }

    /// Returns the concrete element if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Element>(&self) -> Option<&T> {
        self.concrete().as_any().downcast_ref()
    }

    /// Returns the concrete element mutably if it is a `T`.
    #[must_use]
    pub fn downcast_mut<T: Element>(&mut self) -> Option<&mut T> {
        if (*self).as_any().is::<Box<dyn Element>>() {
            return (*self)
                .as_any_mut()
                .downcast_mut::<Box<dyn Element>>()
                .and_then(|inner| inner.downcast_mut::<T>());
        }
        (*self).as_any_mut().downcast_mut()
    }

    /// The element behind any number of `Box<dyn Element>` layers.
    ///
    /// `Box<dyn Element>` is itself an [`Element`], so a boxed element that
    /// gets boxed again would otherwise hide its concrete type.
    #[must_use]
    pub fn concrete(&self) -> &dyn Element {
        let mut current = self;
        while let Some(inner) = current.as_any().downcast_ref::<Box<dyn Element>>() {
            current = &**inner;
        }
        current
    }
}

/// Strips redundant `Box<dyn Element>` layers from `item`.
pub(crate) fn unnest(mut item: Box<dyn Element>) -> Box<dyn Element> {
    loop {
        let element: &mut dyn Element = &mut *item;
        match element.as_any_mut().downcast_mut::<Box<dyn Element>>() {
            Some(inner) => item = std::mem::replace(inner, Box::new(())),
            None => return item,
        }
    }
}

/// An ordered, heterogeneous sequence in wire order
pub type Sequence = Vec<Box<dyn Element>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Comment {
        no: u32,
    }

    fn double_boxed() -> Box<dyn Element> {
        let inner: Box<dyn Element> = Box::new(Comment { no: 1 });
        Box::new(inner)
    }

    #[test]
    fn looks_through_nested_boxes() {
        let mut element = double_boxed();
        assert!(element.is::<Comment>());
        assert_eq!(element.downcast_ref::<Comment>(), Some(&Comment { no: 1 }));
        assert!(element.concrete().type_name().ends_with("Comment"));

        if let Some(comment) = element.downcast_mut::<Comment>() {
            comment.no = 2;
        }
        assert_eq!(element.downcast_ref::<Comment>(), Some(&Comment { no: 2 }));
    }

    #[test]
    fn unnest_keeps_the_concrete_element() {
        let element = unnest(double_boxed());
        assert!((*element).as_any().is::<Comment>());

        let plain = unnest(Box::new(Comment { no: 3 }));
        assert!((*plain).as_any().is::<Comment>());
    }
}
