//! Leak detection at step boundaries.
//!
//! [`Registry::assert_no_pending_operations`] fails immediately, with no
//! grace period, if anything is still pending. [`StepGuard`] runs that
//! check after every step it wraps, so a step that forgets to wait for the
//! work it started fails on the spot, naming the forgotten operation.
//!
//! # Example
//!
//! ```rust
//! use tracked_async::{CallSite, Registry, StepGuard, TrackedOperation};
//!
//! let registry = Registry::new();
//! let guard = StepGuard::new(&registry);
//!
//! let leaky = guard.guard_sync(|registry: Registry| {
//!     let op = TrackedOperation::new(&registry, CallSite::here("Db", "save", vec![]), async {});
//!     drop(op); // never awaited
//! });
//!
//! let err = leaky(registry.clone()).unwrap_err();
//! assert!(err.report().mentions("Db.save()"));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use pin_project::pin_project;
use tracing::error;

use crate::error::{Error, Result};
use crate::registry::Registry;

impl Registry {
    /// Fails if any operation is pending right now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LeakedOperations`] listing every pending entry.
    pub fn assert_no_pending_operations(&self) -> Result<()> {
        let report = self.snapshot();
        if report.is_empty() {
            return Ok(());
        }
        error!(pending = report.len(), "operations leaked past a step boundary");
        Err(Error::leaked(report))
    }
}

/// Assert that a registry has no pending operations.
///
/// # Panics
///
/// Panics with the full pending report if anything is pending.
///
/// # Example
///
/// ```rust
/// use tracked_async::{assert_quiescent, Registry};
///
/// let registry = Registry::new();
/// assert_quiescent!(registry);
/// ```
#[macro_export]
macro_rules! assert_quiescent {
    ($registry:expr) => {{
        if let ::std::result::Result::Err(err) = $registry.assert_no_pending_operations() {
            panic!("assertion failed: expected no pending operations, {}", err);
        }
    }};
    ($registry:expr, $($arg:tt)+) => {{
        if let ::std::result::Result::Err(err) = $registry.assert_no_pending_operations() {
            panic!(
                "assertion failed: expected no pending operations, {}: {}",
                err,
                format_args!($($arg)+)
            );
        }
    }};
}

/// Wraps test steps so each one ends with a leak check.
#[derive(Clone, Debug)]
pub struct StepGuard {
    registry: Registry,
}

impl StepGuard {
    /// Creates a guard checking `registry`.
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
        }
    }

    /// The registry being checked.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs one step future, then checks for leaks.
    pub fn run<F: Future>(&self, step: F) -> Guarded<F> {
        Guarded {
            step,
            registry: self.registry.clone(),
        }
    }

    /// Wraps an asynchronous step.
    ///
    /// The wrapped step awaits the original, then checks for leaks.
    pub fn guard<A, F, Fut>(&self, step: F) -> impl Fn(A) -> Guarded<Fut>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        let registry = self.registry.clone();
        move |args| Guarded {
            step: step(args),
            registry: registry.clone(),
        }
    }

    /// Wraps a synchronous step; the check runs right after it returns.
    pub fn guard_sync<A, R, F>(&self, step: F) -> impl Fn(A) -> Result<R>
    where
        F: Fn(A) -> R,
    {
        let registry = self.registry.clone();
        move |args| {
            let output = step(args);
            registry.assert_no_pending_operations().map(|()| output)
        }
    }
}

/// A step future followed by a leak check.
///
/// Created by [`StepGuard::run`] and [`StepGuard::guard`].
#[pin_project]
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Guarded<F> {
    #[pin]
    step: F,
    registry: Registry,
}

impl<F: Future> Future for Guarded<F> {
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let output = ready!(this.step.poll(cx));
        Poll::Ready(this.registry.assert_no_pending_operations().map(|()| output))
    }
}
