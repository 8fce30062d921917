//! Error definitions
//!
//! Both kinds of failure carry a [`PendingReport`] so the message is
//! self-contained: every pending operation's description and call site.

use std::time::Duration;

use thiserror::Error;

use crate::registry::PendingReport;

/// Main error type for tracked-async
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Operations were still pending at an assertion point.
    #[error("{count} pending operation(s):\n{0}", count = .0.len())]
    LeakedOperations(PendingReport),

    /// The registry did not drain before the timeout elapsed.
    #[error("Gave up waiting after {timeout:?} for:\n{report}")]
    QuiescenceTimeout {
        /// How long the waiter waited.
        timeout: Duration,
        /// Operations still pending when the timeout fired.
        report: PendingReport,
    },
}

impl Error {
    /// Create a leaked operations error.
    #[must_use]
    pub fn leaked(report: PendingReport) -> Self {
        Self::LeakedOperations(report)
    }

    /// Create a quiescence timeout error.
    #[must_use]
    pub fn timeout(timeout: Duration, report: PendingReport) -> Self {
        Self::QuiescenceTimeout { timeout, report }
    }

    /// The pending operations this error is about.
    #[must_use]
    pub fn report(&self) -> &PendingReport {
        match self {
            Self::LeakedOperations(report) | Self::QuiescenceTimeout { report, .. } => report,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
