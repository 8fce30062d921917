//! smol timer for the quiescence waiter.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::TimeSource;

/// smol's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmolTime;

impl TimeSource for SmolTime {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            ::smol::Timer::after(duration).await;
        })
    }
}
