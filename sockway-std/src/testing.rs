//! Testing utilities for sockway.
//!
//! Handlers with observable side effects, usable with any context type.
//!
//! - [`CountingHandler`]: counts invocations and continues
//! - [`HaltingHandler`]: counts invocations and short-circuits
//! - [`FailingHandler`]: fails every invocation
//! - [`OrderRecordingHandler`]: records its id into a shared order log

use async_trait::async_trait;
use sockway_core::{BoxError, Handler, Next};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Counting Handler
// ============================================================================

/// A handler that counts invocations and then continues the chain.
///
/// # Example
///
/// ```rust,ignore
/// let counter = CountingHandler::new();
/// namespace.middleware(counter.clone());
///
/// // dispatch ...
///
/// assert_eq!(counter.count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    /// Create a new counting handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<C: Send + 'static> Handler<C> for CountingHandler {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        next.run(ctx).await
    }
}

// ============================================================================
// Halting Handler
// ============================================================================

/// A handler that counts invocations and never calls `next`.
#[derive(Clone, Default)]
pub struct HaltingHandler {
    count: Arc<AtomicUsize>,
}

impl HaltingHandler {
    /// Create a new halting handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Send + 'static> Handler<C> for HaltingHandler {
    async fn handle(&self, _ctx: &mut C, _next: Next<'_, C>) -> Result<(), BoxError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Failing Handler
// ============================================================================

/// A handler that fails with a fixed message.
#[derive(Clone)]
pub struct FailingHandler {
    message: String,
    count: Arc<AtomicUsize>,
}

impl FailingHandler {
    /// Create a failing handler.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of failed invocations.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Send + 'static> Handler<C> for FailingHandler {
    async fn handle(&self, _ctx: &mut C, _next: Next<'_, C>) -> Result<(), BoxError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Err(self.message.clone().into())
    }
}

// ============================================================================
// Order Recording Handler
// ============================================================================

/// A handler that records its id into a shared log, then continues.
pub struct OrderRecordingHandler {
    /// Value pushed to `order` on every invocation.
    pub id: usize,
    /// Shared log.
    pub order: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl<C: Send + 'static> Handler<C> for OrderRecordingHandler {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> Result<(), BoxError> {
        self.order.lock().unwrap().push(self.id);
        next.run(ctx).await
    }
}
