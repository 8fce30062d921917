//! Runtime timers for the quiescence waiter.
//!
//! The waiter needs one thing from a runtime: a future that completes after
//! the timeout. [`TimeSource`] is that seam, so the same waiter runs on
//! Tokio, async-std, smol, or a hand-rolled timer in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracked_async::runtime::tokio::TokioTime;
//!
//! registry
//!     .wait_for_quiescence_with(&TokioTime, Duration::from_millis(50))
//!     .await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Bounds a quiescence wait.
///
/// The waiter races this sleep against the registry draining and drops it
/// when the registry wins, so dropping the future must cancel the timer.
///
/// # Implementations
///
/// - `TokioTime` - Tokio timer, follows paused time (with `tokio` feature)
/// - `AsyncStdTime` - async-std timer (with `async-std` feature)
/// - `SmolTime` - smol timer (with `smol` feature)
pub trait TimeSource: Send + Sync {
    /// A future that completes after `duration`.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[cfg(feature = "tokio")]
pub mod tokio;

#[cfg(feature = "async-std")]
pub mod async_std;

#[cfg(feature = "smol")]
pub mod smol;
