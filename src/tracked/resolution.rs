//! The tagged result a continuation settles with.

use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

use super::TrackedOperation;

/// What an asynchronous step produced: a plain value, or more asynchronous
/// work whose own result is the real answer.
///
/// A [`TrackedOperation`] keeps following `Forwarding` links until it
/// reaches an `Immediate` value, and only then counts as settled.
pub enum Resolution<T> {
    /// The terminal value.
    Immediate(T),
    /// The value is whatever this nested work eventually resolves to.
    Forwarding(BoxFuture<'static, Resolution<T>>),
}

impl<T: Send + 'static> Resolution<T> {
    /// A terminal value.
    pub fn immediate(value: T) -> Self {
        Self::Immediate(value)
    }

    /// Forward to a future producing the terminal value.
    pub fn forward<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::Forwarding(future.map(Resolution::Immediate).boxed())
    }

    /// Forward to a future that may itself forward again.
    pub fn nested<F>(future: F) -> Self
    where
        F: Future<Output = Resolution<T>> + Send + 'static,
    {
        Self::Forwarding(future.boxed())
    }

    /// Returns true if this is a terminal value.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate(_))
    }
}

impl<T: Send + 'static> From<TrackedOperation<T>> for Resolution<T> {
    fn from(operation: TrackedOperation<T>) -> Self {
        Self::forward(operation)
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Self::Forwarding(_) => f.write_str("Forwarding(..)"),
        }
    }
}
