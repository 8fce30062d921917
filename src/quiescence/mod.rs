//! Waiting for the registry to drain.
//!
//! [`Registry::wait_for_quiescence`] is the synchronization point a test
//! driver uses before asserting on final state: it completes as soon as no
//! tracked operation is pending, or fails after a timeout with a report of
//! everything still outstanding.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = Registry::new();
//! let db = registry.wrap(Database::new());
//!
//! tokio::spawn(db.create_item("Glazed".into()));
//! registry.wait_for_quiescence().await?;
//! ```
//!
//! The timeout bounds the wait, not the operations: pending work keeps
//! running (or stays stuck) after the waiter gives up.

use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::registry::{Registry, WaiterId};
use crate::runtime::TimeSource;

impl Registry {
    /// Waits for quiescence with the configured default timeout (500ms unless
    /// changed in [`TrackerConfig`](crate::TrackerConfig)).
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuiescenceTimeout`] if operations are still pending
    /// when the timeout elapses.
    #[cfg(feature = "tokio")]
    pub async fn wait_for_quiescence(&self) -> Result<()> {
        self.wait_for_quiescence_for(self.config().default_timeout).await
    }

    /// Waits for quiescence, giving up after `timeout`. Uses the Tokio timer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuiescenceTimeout`] if operations are still pending
    /// when the timeout elapses.
    #[cfg(feature = "tokio")]
    pub async fn wait_for_quiescence_for(&self, timeout: Duration) -> Result<()> {
        self.wait_for_quiescence_with(&crate::runtime::tokio::TokioTime, timeout).await
    }

    /// Waits for quiescence using `time` for the timeout.
    ///
    /// Completes immediately, without starting a timer, if nothing is
    /// pending. If the registry drains and the timer fires together, the
    /// drain wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuiescenceTimeout`] if operations are still pending
    /// when the timeout elapses.
    pub async fn wait_for_quiescence_with(
        &self,
        time: &dyn TimeSource,
        timeout: Duration,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel::<()>();
        let Some(id) = self.enqueue_waiter(move || {
            let _ = tx.send(());
        }) else {
            return Ok(());
        };
        // Withdrawn on timeout or when this future is dropped mid-wait.
        let _queued = QueuedWaiter { registry: self, id };

        debug!(?timeout, pending = self.pending_count(), "waiting for quiescence");
        // Whichever side loses is dropped here, which cancels the timer.
        match future::select(rx, time.sleep(timeout)).await {
            Either::Left(_) => Ok(()),
            Either::Right(((), _)) => {
                let report = self.snapshot();
                if report.is_empty() {
                    return Ok(());
                }
                warn!(?timeout, pending = report.len(), "gave up waiting for quiescence");
                Err(Error::timeout(timeout, report))
            }
        }
    }
}

struct QueuedWaiter<'a> {
    registry: &'a Registry,
    id: WaiterId,
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        self.registry.cancel_waiter(self.id);
    }
}
