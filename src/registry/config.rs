//! Tracker configuration.

use std::time::Duration;

/// Environment variable that turns on backtrace capture.
pub const BACKTRACE_ENV: &str = "TRACKED_ASYNC_BACKTRACE";

/// Configuration for a [`Registry`](super::Registry).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Timeout used by [`Registry::wait_for_quiescence`](super::Registry::wait_for_quiescence).
    pub default_timeout: Duration,
    /// Rendered arguments longer than this are truncated.
    pub max_arg_len: usize,
    /// Capture a cleaned backtrace for every tracked operation.
    pub capture_backtrace: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(500),
            max_arg_len: 120,
            capture_backtrace: false,
        }
    }
}

impl TrackerConfig {
    /// Create a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration, with backtrace capture taken from
    /// `TRACKED_ASYNC_BACKTRACE` (`1`, `true` or `full`).
    #[must_use]
    pub fn from_env() -> Self {
        let capture = std::env::var(BACKTRACE_ENV)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "full"))
            .unwrap_or(false);
        Self {
            capture_backtrace: capture,
            ..Self::default()
        }
    }

    /// Set the default quiescence timeout.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the maximum rendered argument length.
    #[must_use]
    pub fn max_arg_len(mut self, len: usize) -> Self {
        self.max_arg_len = len;
        self
    }

    /// Capture backtraces for every tracked operation.
    #[must_use]
    pub fn capture_backtrace(mut self) -> Self {
        self.capture_backtrace = true;
        self
    }
}
