//! Logging middleware for event observation.

use async_trait::async_trait;
use sockway_core::{BoxError, Handler, Next};
use std::fmt::Debug;

/// A middleware that logs every context passing through it, and how long the
/// rest of the chain took.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl<C: Debug + Send + 'static> Handler<C> for LoggingMiddleware {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError> {
        #[cfg(feature = "tracing")]
        {
            tracing::debug!(?ctx, "processing event");
            let started = std::time::Instant::now();
            let result = next.run(ctx).await;
            match &result {
                Ok(()) => tracing::debug!(elapsed = ?started.elapsed(), "event processed"),
                Err(err) => tracing::debug!(elapsed = ?started.elapsed(), %err, "event failed"),
            }
            result
        }
        #[cfg(not(feature = "tracing"))]
        {
            next.run(ctx).await
        }
    }
}
