//! async-std timer for the quiescence waiter.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::TimeSource;

/// async-std's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncStdTime;

impl TimeSource for AsyncStdTime {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(::async_std::task::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::{CallSite, Registry};
    use crate::tracked::TrackedOperation;

    #[test]
    fn test_wait_drains_on_async_std() {
        let registry = Registry::new();
        let op = TrackedOperation::new(
            &registry,
            CallSite::here("Timer", "tick", vec![]),
            ::async_std::task::sleep(Duration::from_millis(5)),
        );

        ::async_std::task::block_on(async {
            ::async_std::task::spawn(op);
            registry
                .wait_for_quiescence_with(&AsyncStdTime, Duration::from_secs(1))
                .await
                .unwrap();
        });
        assert!(registry.is_empty());
    }

    #[test]
    fn test_wait_times_out_on_async_std() {
        let registry = Registry::new();
        let _stuck = TrackedOperation::new(
            &registry,
            CallSite::here("Timer", "never", vec![]),
            futures::future::pending::<()>(),
        );

        let err = ::async_std::task::block_on(
            registry.wait_for_quiescence_with(&AsyncStdTime, Duration::from_millis(5)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::QuiescenceTimeout { .. }));
        assert_eq!(err.report().descriptions(), vec!["Timer.never()"]);
    }
}
