//! Tokio timer for the quiescence waiter.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::TimeSource;

/// Tokio's timer.
///
/// Follows `tokio::time::pause`, so waits in paused tests cost no real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTime;

impl TimeSource for TokioTime {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(::tokio::time::sleep(duration))
    }
}
