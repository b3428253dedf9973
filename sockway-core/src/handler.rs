//! # Handler Layer
//!
//! The unit of work in sockway. Middleware, postware and listeners are all
//! [`Handler`]s; they differ only in where they are registered.
//!
//! A handler receives the shared context and a [`Next`] continuation. Awaiting
//! `next.run(ctx)` runs the rest of the chain and returns once it completes, so
//! code placed after the await observes downstream effects. Returning without
//! calling `next` short-circuits the chain. Returning `Err` aborts it.
//!
//! ```rust,ignore
//! struct Auth;
//!
//! #[async_trait]
//! impl Handler<MyContext> for Auth {
//!     async fn handle(&self, ctx: &mut MyContext, next: Next<'_, MyContext>) -> Result<(), BoxError> {
//!         if ctx.user.is_none() {
//!             return Ok(()); // stop here
//!         }
//!         next.run(ctx).await
//!     }
//! }
//! ```

use crate::{chain::Next, error::BoxError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// An asynchronous handler sharing one mutable context with the rest of its chain.
#[async_trait]
pub trait Handler<C: Send + 'static>: Send + Sync + 'static {
    /// Process the context, optionally delegating to the rest of the chain.
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError>;
}

/// A shared, type-erased handler.
pub type BoxHandler<C> = Arc<dyn Handler<C>>;

#[async_trait]
impl<C: Send + 'static> Handler<C> for Arc<dyn Handler<C>> {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError> {
        (**self).handle(ctx, next).await
    }
}

/// Identity of one handler registration.
///
/// Ids are unique for the lifetime of the process and are used to remove a
/// specific registration again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        HandlerId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A [`Handler`] backed by a closure returning a boxed future.
pub struct HandlerFn<F, C> {
    f: F,
    _context: PhantomData<fn(&mut C)>,
}

/// Wrap a closure as a [`Handler`].
///
/// ```rust,ignore
/// let h = handler_fn(|ctx: &mut MyContext, next| Box::pin(async move {
///     ctx.seen = true;
///     next.run(ctx).await
/// }));
/// ```
pub fn handler_fn<C, F>(f: F) -> HandlerFn<F, C>
where
    C: Send + 'static,
    F: for<'a> Fn(&'a mut C, Next<'a, C>) -> BoxFuture<'a, Result<(), BoxError>>
        + Send
        + Sync
        + 'static,
{
    HandlerFn {
        f,
        _context: PhantomData,
    }
}

#[async_trait]
impl<C, F> Handler<C> for HandlerFn<F, C>
where
    C: Send + 'static,
    F: for<'a> Fn(&'a mut C, Next<'a, C>) -> BoxFuture<'a, Result<(), BoxError>>
        + Send
        + Sync
        + 'static,
{
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError> {
        (self.f)(ctx, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_ids_are_unique() {
        let a = HandlerId::next();
        let b = HandlerId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }
}
