//! # tracked-async
//!
//! > Know when your async test has actually finished
//!
//! **tracked-async** records every asynchronous operation your test starts
//! through an instrumented facade, lets the test wait until all of them have
//! settled, and fails loudly, naming the operation and where it was started,
//! when a test step leaves work behind.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tracked_async::prelude::*;
//!
//! #[tracked_async::instrument]
//! impl Database {
//!     pub async fn create_item(&self, name: String) { /* ... */ }
//!     pub async fn fetch_all_items(&self) -> Vec<String> { /* ... */ }
//! }
//!
//! #[tracked_async::test]
//! async fn adds_an_item(registry: Registry) {
//!     let db = registry.wrap(Database::default());
//!
//!     tokio::spawn(db.create_item("Glazed".into()));
//!     registry.wait_for_quiescence().await.unwrap();
//!
//!     assert_eq!(db.fetch_all_items().await, vec!["Glazed"]);
//! } // fails here if anything is still pending
//! ```
//!
//! ## Pieces
//!
//! - [`Registry`] - the set of pending operations and who is waiting on them
//! - [`TrackedOperation`] - a future that stays registered until its
//!   innermost result settles
//! - [`Instrumented`] - the facade that turns calls into tracked operations
//! - [`Registry::wait_for_quiescence`] - bounded wait for the registry to drain
//! - [`StepGuard`] - fails a step that returns with work still pending

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod guard;
pub mod instrument;
pub mod quiescence;
pub mod registry;
pub mod runtime;
pub mod tracked;

/// Prelude for convenient imports
///
/// ```rust
/// use tracked_async::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::guard::{Guarded, StepGuard};
    pub use crate::instrument::{render_arg, Instrumented};
    pub use crate::registry::{CallSite, PendingReport, Registry, TrackerConfig};
    pub use crate::tracked::{Resolution, TrackedOperation};
}

// Re-exports
pub use error::{Error, Result};
pub use guard::{Guarded, StepGuard};
pub use instrument::{render_arg, Instrumented};
pub use registry::{CallSite, OperationId, PendingEntry, PendingReport, Registry, TrackerConfig};
pub use tracked::{Resolution, TrackedOperation};

// Re-export the attribute macros when the macros feature is enabled
#[cfg(feature = "macros")]
pub use tracked_async_macros::{instrument, test};
