//! The registry of pending operations.
//!
//! A [`Registry`] is the single piece of shared mutable state: the set of
//! operations that have started but not settled, plus the callbacks waiting
//! for that set to drain. It is constructed explicitly and handed to the
//! facade, the waiter and the guard, so independent test runs in one process
//! never see each other's operations.
//!
//! Only [`TrackedOperation`](crate::TrackedOperation) mutates a registry.
//! Everything else reads it through [`Registry::snapshot`],
//! [`Registry::is_empty`] and [`Registry::pending_count`].
//!
//! # Example
//!
//! ```rust
//! use tracked_async::Registry;
//!
//! let registry = Registry::new();
//! assert!(registry.is_empty());
//! assert!(registry.snapshot().is_empty());
//! ```

mod config;
mod entry;

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

pub use config::{TrackerConfig, BACKTRACE_ENV};
pub use entry::{CallSite, OperationId, PendingEntry, PendingReport};

/// Callback run once when the registry drains.
pub(crate) type Waiter = Box<dyn FnOnce() + Send>;

/// Handle to a queued waiter, used to withdraw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WaiterId(u64);

/// Tracks every operation that has started but not yet settled.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Pending entries and waiters change together under one lock.
    state: Mutex<RegistryState>,
    config: TrackerConfig,
}

#[derive(Default)]
struct RegistryState {
    pending: BTreeMap<OperationId, PendingEntry>,
    /// Non-empty only while `pending` is non-empty.
    waiters: Vec<(WaiterId, Waiter)>,
    next_waiter: u64,
}

impl Registry {
    /// Creates an empty registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    /// Creates an empty registry with the given configuration.
    #[must_use]
    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                config,
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Returns the number of pending operations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().pending.is_empty()
    }

    /// Returns every pending entry, ordered by ID.
    #[must_use]
    pub fn snapshot(&self) -> PendingReport {
        let state = self.inner.state.lock();
        PendingReport::new(state.pending.values().cloned().collect())
    }

    /// Returns true if `other` shares state with this registry.
    #[must_use]
    pub fn same_as(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Builds a call site, attaching a backtrace if configured to.
    pub(crate) fn call_site(
        &self,
        target: impl Into<String>,
        operation: impl Into<String>,
        args: Vec<String>,
        location: &'static Location<'static>,
    ) -> CallSite {
        let site = CallSite::new(target, operation, args, location);
        if self.inner.config.capture_backtrace {
            site.with_backtrace()
        } else {
            site
        }
    }

    pub(crate) fn register(&self, entry: PendingEntry) {
        let mut state = self.inner.state.lock();
        debug!(id = %entry.id, description = %entry.description, "operation started");
        state.pending.insert(entry.id, entry);
    }

    pub(crate) fn contains(&self, id: OperationId) -> bool {
        self.inner.state.lock().pending.contains_key(&id)
    }

    /// Removes an entry. Returns false if it was already gone.
    ///
    /// When the last entry goes, every queued waiter runs once, in the order
    /// they were queued, after the lock is released.
    pub(crate) fn deregister(&self, id: OperationId) -> bool {
        let waiters = {
            let mut state = self.inner.state.lock();
            let Some(entry) = state.pending.remove(&id) else {
                trace!(%id, "ignoring repeated settlement");
                return false;
            };
            debug!(%id, description = %entry.description, "operation settled");
            if state.pending.is_empty() {
                std::mem::take(&mut state.waiters)
            } else {
                Vec::new()
            }
        };

        if !waiters.is_empty() {
            debug!(count = waiters.len(), "registry drained, notifying waiters");
        }
        for (_, waiter) in waiters {
            waiter();
        }
        true
    }

    /// Queues a callback for the next time the registry drains.
    ///
    /// Returns `None`, without queuing, if the registry is already empty.
    pub(crate) fn enqueue_waiter(
        &self,
        waiter: impl FnOnce() + Send + 'static,
    ) -> Option<WaiterId> {
        let mut state = self.inner.state.lock();
        if state.pending.is_empty() {
            return None;
        }
        let id = WaiterId(state.next_waiter);
        state.next_waiter += 1;
        state.waiters.push((id, Box::new(waiter)));
        Some(id)
    }

    /// Withdraws a queued waiter. Returns false if it already ran.
    pub(crate) fn cancel_waiter(&self, id: WaiterId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.waiters.len();
        state.waiters.retain(|(queued, _)| *queued != id);
        state.waiters.len() != before
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Registry")
            .field("pending", &state.pending.len())
            .field("waiters", &state.waiters.len())
            .finish_non_exhaustive()
    }
}
