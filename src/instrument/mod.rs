//! The instrumentation facade.
//!
//! [`Instrumented<T>`] stands in front of a collaborator. Calls that return
//! futures go through [`Instrumented::track`] and come back as
//! [`TrackedOperation`]s; everything else goes through
//! [`Instrumented::call`] untouched. Work started directly on the
//! collaborator, bypassing the facade, is invisible to the registry.
//!
//! Writing a facade by hand:
//!
//! ```rust
//! use tracked_async::{render_arg, Instrumented, Registry, TrackedOperation};
//!
//! struct Database;
//!
//! impl Database {
//!     async fn create_item(&self, name: String) -> usize {
//!         name.len()
//!     }
//! }
//!
//! trait TrackedDatabase {
//!     fn create_item(&self, name: String) -> TrackedOperation<usize>;
//! }
//!
//! impl TrackedDatabase for Instrumented<Database> {
//!     #[track_caller]
//!     fn create_item(&self, name: String) -> TrackedOperation<usize> {
//!         let target = self.target_arc();
//!         let args = vec![render_arg(&name, self.registry().config().max_arg_len)];
//!         self.track("create_item", args, async move { target.create_item(name).await })
//!     }
//! }
//!
//! let registry = Registry::new();
//! let db = registry.wrap(Database);
//! let op = db.create_item("Sprinkled".to_string());
//! assert_eq!(op.description(), "Database.create_item(\"Sprinkled\")");
//! assert_eq!(futures::executor::block_on(op), 9);
//! ```
//!
//! With the `macros` feature, `#[tracked_async::instrument]` on the
//! `impl Database` block generates the same trait.

use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use crate::registry::Registry;
use crate::tracked::TrackedOperation;

/// A facade recording every asynchronous call made through it.
pub struct Instrumented<T> {
    registry: Registry,
    target: Arc<T>,
    type_name: &'static str,
}

impl<T> Instrumented<T> {
    /// Wraps `target`.
    #[must_use]
    pub fn new(registry: &Registry, target: T) -> Self {
        Self::from_arc(registry, Arc::new(target))
    }

    /// Wraps a shared `target`.
    #[must_use]
    pub fn from_arc(registry: &Registry, target: Arc<T>) -> Self {
        Self {
            registry: registry.clone(),
            target,
            type_name: short_type_name::<T>(),
        }
    }

    /// The registry calls are recorded in.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The wrapped collaborator.
    ///
    /// Calls made on it directly are not tracked.
    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    /// A shared handle to the collaborator, for moving into futures.
    #[must_use]
    pub fn target_arc(&self) -> Arc<T> {
        Arc::clone(&self.target)
    }

    /// The name used in descriptions, `Database` for `my_app::db::Database`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Tracks an asynchronous call named `operation` with rendered `args`.
    #[track_caller]
    pub fn track<F>(&self, operation: &str, args: Vec<String>, future: F) -> TrackedOperation<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let call_site = self
            .registry
            .call_site(self.type_name, operation, args, Location::caller());
        TrackedOperation::new(&self.registry, call_site, future)
    }

    /// Runs a synchronous call; the result passes through unmodified.
    pub fn call<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.target)
    }
}

impl<T> Clone for Instrumented<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            target: Arc::clone(&self.target),
            type_name: self.type_name,
        }
    }
}

impl<T> fmt::Debug for Instrumented<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumented")
            .field("target", &self.type_name)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Registry {
    /// Wraps `target` in a facade recording into this registry.
    #[must_use]
    pub fn wrap<T>(&self, target: T) -> Instrumented<T> {
        Instrumented::new(self, target)
    }
}

/// Renders one argument with `Debug`, truncated to `max_len` characters.
#[must_use]
pub fn render_arg<A: fmt::Debug + ?Sized>(arg: &A, max_len: usize) -> String {
    let rendered = format!("{arg:?}");
    if rendered.chars().count() <= max_len {
        return rendered;
    }
    let mut cut: String = rendered.chars().take(max_len).collect();
    cut.push('…');
    cut
}

/// The last path segment of a type name, generics stripped.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
