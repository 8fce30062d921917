//! Tracked operations.
//!
//! A [`TrackedOperation`] wraps one piece of asynchronous work. It is
//! registered with its [`Registry`] the moment it is created and removed
//! when its true terminal value is available. If the work resolves to more
//! work (a [`Resolution::Forwarding`]), the operation follows the chain and
//! stays pending until the innermost result settles.
//!
//! # Example
//!
//! ```rust
//! use tracked_async::{CallSite, Registry, TrackedOperation};
//!
//! let registry = Registry::new();
//! let op = TrackedOperation::new(&registry, CallSite::here("Calc", "add", vec![]), async { 1 + 1 });
//! let doubled = op.map(|n| n * 2);
//!
//! assert_eq!(registry.pending_count(), 2);
//! assert_eq!(futures::executor::block_on(doubled), 4);
//! assert!(registry.is_empty());
//! ```

mod resolution;

use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::future::{self, BoxFuture, FutureExt};
use tracing::{trace, warn};

use crate::registry::{CallSite, OperationId, PendingEntry, Registry};

pub use resolution::Resolution;

/// A future whose lifetime is recorded in a [`Registry`].
///
/// Every continuation attached with [`then`](Self::then) and friends is a new
/// `TrackedOperation` with its own entry, named after its parent.
///
/// Dropping an operation before it settles abandons the work, and its entry
/// stays in the registry. That is how forgotten work shows up in
/// diagnostics instead of vanishing.
#[must_use = "tracked operations do nothing unless polled, and stay pending if dropped"]
pub struct TrackedOperation<T> {
    id: OperationId,
    description: String,
    registry: Registry,
    /// `None` once settled.
    current: Option<BoxFuture<'static, Resolution<T>>>,
    /// Number of forwarding links followed so far.
    hops: usize,
}

impl<T: Send + 'static> TrackedOperation<T> {
    /// Starts tracking `future`.
    pub fn new<F>(registry: &Registry, call_site: CallSite, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::from_resolution(registry, call_site, Resolution::forward(future))
    }

    /// Starts tracking an already tagged result.
    pub fn from_resolution(
        registry: &Registry,
        call_site: CallSite,
        resolution: Resolution<T>,
    ) -> Self {
        let id = OperationId::new();
        let entry = PendingEntry::new(id, call_site);
        let description = entry.description.clone();
        registry.register(entry);

        let current = match resolution {
            Resolution::Immediate(value) => future::ready(Resolution::Immediate(value)).boxed(),
            Resolution::Forwarding(next) => next,
        };

        Self {
            id,
            description,
            registry: registry.clone(),
            current: Some(current),
            hops: 0,
        }
    }

    /// Attaches a continuation that may settle with more asynchronous work.
    #[track_caller]
    pub fn then<U, F>(self, continuation: F) -> TrackedOperation<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Resolution<U> + Send + 'static,
    {
        self.chain(type_label::<F>(), Location::caller(), continuation)
    }

    /// Attaches a continuation producing a plain value.
    #[track_caller]
    pub fn map<U, F>(self, continuation: F) -> TrackedOperation<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(type_label::<F>(), Location::caller(), move |value| {
            Resolution::Immediate(continuation(value))
        })
    }

    /// Attaches a continuation whose result is itself a future.
    ///
    /// The new operation settles when that future does.
    #[track_caller]
    pub fn then_async<U, Fut, F>(self, continuation: F) -> TrackedOperation<U>
    where
        U: Send + 'static,
        Fut: Future<Output = U> + Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
    {
        self.chain(type_label::<F>(), Location::caller(), move |value| {
            Resolution::forward(continuation(value))
        })
    }

    fn chain<U, F>(
        self,
        label: String,
        location: &'static Location<'static>,
        continuation: F,
    ) -> TrackedOperation<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Resolution<U> + Send + 'static,
    {
        let registry = self.registry.clone();
        let call_site = registry.call_site(self.description.clone(), "then", vec![label], location);
        let parent = self;
        TrackedOperation::from_resolution(
            &registry,
            call_site,
            Resolution::nested(async move { continuation(parent.await) }),
        )
    }
}

impl<T, E> TrackedOperation<Result<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Attaches separate continuations for success and failure.
    #[track_caller]
    pub fn continue_with<U, S, F>(self, on_success: S, on_failure: F) -> TrackedOperation<U>
    where
        U: Send + 'static,
        S: FnOnce(T) -> Resolution<U> + Send + 'static,
        F: FnOnce(E) -> Resolution<U> + Send + 'static,
    {
        let label = format!("{}, {}", type_label::<S>(), type_label::<F>());
        self.chain(label, Location::caller(), move |result| match result {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        })
    }
}

impl<T> TrackedOperation<T> {
    /// The registry entry's ID.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// The diagnostic description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The registry this operation is recorded in.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns true once the terminal value has been produced.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.current.is_none()
    }

    /// Number of forwarding links followed so far.
    #[must_use]
    pub fn forwarding_hops(&self) -> usize {
        self.hops
    }
}

impl<T> Future for TrackedOperation<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            let Some(current) = this.current.as_mut() else {
                panic!("TrackedOperation polled after completion");
            };
            let mut unwind = SettleOnUnwind {
                registry: &this.registry,
                id: this.id,
                armed: true,
            };
            let polled = current.as_mut().poll(cx);
            unwind.armed = false;
            drop(unwind);

            match ready!(polled) {
                Resolution::Immediate(value) => {
                    this.current = None;
                    this.registry.deregister(this.id);
                    return Poll::Ready(value);
                }
                Resolution::Forwarding(next) => {
                    this.hops += 1;
                    trace!(id = %this.id, hops = this.hops, "following forwarded result");
                    this.current = Some(next);
                }
            }
        }
    }
}

/// Settles the entry if the wrapped future panics, so a panic counts as a
/// failed operation rather than a leak.
struct SettleOnUnwind<'a> {
    registry: &'a Registry,
    id: OperationId,
    armed: bool,
}

impl Drop for SettleOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(id = %self.id, "tracked operation panicked, settling it");
            self.registry.deregister(self.id);
        }
    }
}

impl<T> Drop for TrackedOperation<T> {
    fn drop(&mut self) {
        if self.current.is_some() && self.registry.contains(self.id) {
            warn!(
                id = %self.id,
                description = %self.description,
                "tracked operation dropped before settling, it stays pending"
            );
        }
    }
}

impl<T> fmt::Debug for TrackedOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedOperation")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

fn type_label<F>() -> String {
    std::any::type_name::<F>().to_string()
}
