//! Timeout middleware for time-limited chains.

use async_trait::async_trait;
use sockway_core::{BoxError, Handler, Next};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Error returned when the rest of a chain runs past its deadline.
#[derive(Error, Debug, Clone)]
#[error("handler chain timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// A middleware that fails the chain if everything after it takes longer
/// than `duration`.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    /// Create a new timeout middleware.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl<C: Send + 'static> Handler<C> for TimeoutMiddleware {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError> {
        match timeout(self.duration, next.run(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(Box::new(TimeoutError(self.duration))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockway_core::{BoxHandler, Chain, handler_fn};
    use std::sync::Arc;

    struct Ctx;

    fn sleeper(ms: u64) -> BoxHandler<Ctx> {
        Arc::new(handler_fn(move |ctx: &mut Ctx, next| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                next.run(ctx).await
            })
        }))
    }

    #[tokio::test]
    async fn test_fast_chain_passes() {
        let limit: BoxHandler<Ctx> = Arc::new(TimeoutMiddleware::new(Duration::from_millis(500)));
        let chain = Chain::compose([
            limit,
            sleeper(1),
        ]);
        assert!(chain.call(&mut Ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_chain_times_out() {
        let limit: BoxHandler<Ctx> = Arc::new(TimeoutMiddleware::new(Duration::from_millis(10)));
        let chain = Chain::compose([
            limit,
            sleeper(200),
        ]);
        let err = chain.call(&mut Ctx).await.unwrap_err();
        assert!(err.downcast_ref::<TimeoutError>().is_some());
    }
}
