//! # Composition Primitive
//!
//! Turns an ordered sequence of [`Handler`]s into one callable.
//!
//! [`Chain`] owns an immutable snapshot of its handlers. Registries rebuild a
//! new `Chain` on every write and hand out clones of the current one, so a
//! chain that is already running keeps the snapshot it started with.
//!
//! [`Next`] is the continuation a handler receives. When the handlers of one
//! chain are exhausted it continues into the follow-up continuation attached
//! with [`Next::then`], which is how separate stages (middleware, listeners,
//! postware) are run as one composition sharing one context.

use crate::{
    error::BoxError,
    handler::{BoxHandler, Handler},
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::{fmt, sync::Arc};

/// The rest of a running chain.
pub struct Next<'a, C> {
    rest: &'a [BoxHandler<C>],
    then: Option<Box<Next<'a, C>>>,
}

impl<'a, C: Send + 'static> Next<'a, C> {
    /// A continuation that completes immediately.
    pub fn empty() -> Self {
        Self {
            rest: &[],
            then: None,
        }
    }

    /// A continuation over the given handlers.
    pub fn new(handlers: &'a [BoxHandler<C>]) -> Self {
        Self {
            rest: handlers,
            then: None,
        }
    }

    /// Append `last` after everything this continuation already runs.
    pub fn then(self, last: Next<'a, C>) -> Self {
        let then = match self.then {
            Some(inner) => (*inner).then(last),
            None => last,
        };
        Next {
            rest: self.rest,
            then: Some(Box::new(then)),
        }
    }

    /// Number of handlers still to run, follow-up stages included.
    pub fn remaining(&self) -> usize {
        self.rest.len() + self.then.as_ref().map_or(0, |t| t.remaining())
    }

    /// Run the rest of the chain against `ctx`.
    pub fn run<'b>(self, ctx: &'b mut C) -> BoxFuture<'b, Result<(), BoxError>>
    where
        'a: 'b,
    {
        let Next { rest, then } = self;
        match rest.split_first() {
            Some((head, tail)) => head.handle(ctx, Next { rest: tail, then }),
            None => match then {
                Some(next) => (*next).run(ctx),
                None => Box::pin(async { Ok(()) }),
            },
        }
    }
}

impl<C> fmt::Debug for Next<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("rest", &self.rest.len())
            .field("then", &self.then.is_some())
            .finish()
    }
}

/// A composed, immutable handler sequence.
pub struct Chain<C> {
    handlers: Arc<[BoxHandler<C>]>,
}

impl<C: Send + 'static> Chain<C> {
    /// Compose handlers in the given order.
    pub fn compose<I>(handlers: I) -> Self
    where
        I: IntoIterator<Item = BoxHandler<C>>,
    {
        Self {
            handlers: handlers.into_iter().collect(),
        }
    }

    /// The number of composed handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the chain has no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// A continuation positioned at the first handler.
    pub fn next(&self) -> Next<'_, C> {
        Next::new(&self.handlers)
    }

    /// Run the whole chain.
    pub async fn call(&self, ctx: &mut C) -> Result<(), BoxError> {
        self.next().run(ctx).await
    }

    /// Whether two chains share the same snapshot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handlers, &other.handlers)
    }
}

impl<C> Clone for Chain<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<C> fmt::Debug for Chain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.handlers.len())
            .finish()
    }
}

// A composed chain nests like any other handler: once its own handlers are
// exhausted it continues into the outer `next`.
#[async_trait]
impl<C: Send + 'static> Handler<C> for Chain<C> {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError> {
        self.next().then(next).run(ctx).await
    }
}
