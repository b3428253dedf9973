//! Ordered middleware registry.

use sockway_core::{BoxHandler, Chain, HandlerId};

/// An ordered list of cross-cutting handlers, composed into one [`Chain`].
pub struct MiddlewareRegistry<C> {
    entries: Vec<(HandlerId, BoxHandler<C>)>,
    composed: Option<Chain<C>>,
}

impl<C: Send + 'static> MiddlewareRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            composed: None,
        }
    }

    /// Append a handler under a fresh id.
    pub fn add(&mut self, handler: BoxHandler<C>) -> HandlerId {
        let id = HandlerId::next();
        self.insert(id, handler);
        id
    }

    /// Append a handler under an existing id.
    pub fn insert(&mut self, id: HandlerId, handler: BoxHandler<C>) {
        self.entries.push((id, handler));
        self.recompose();
    }

    /// Remove the handler registered under `id`.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        if self.entries.len() == before {
            return false;
        }
        self.recompose();
        true
    }

    /// The composed chain, if any handler is registered.
    pub fn composed(&self) -> Option<Chain<C>> {
        self.composed.clone()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn recompose(&mut self) {
        self.composed = if self.entries.is_empty() {
            None
        } else {
            Some(Chain::compose(self.entries.iter().map(|(_, h)| h.clone())))
        };
    }
}

impl<C: Send + 'static> Default for MiddlewareRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingHandler, HaltingHandler};
    use std::sync::Arc;

    struct Ctx;

    #[tokio::test]
    async fn test_add_recomposes() {
        let counter = CountingHandler::new();
        let mut registry = MiddlewareRegistry::<Ctx>::new();
        assert!(registry.composed().is_none());

        registry.add(Arc::new(counter.clone()));
        let first = registry.composed().unwrap();
        registry.add(Arc::new(counter.clone()));
        let second = registry.composed().unwrap();

        // The snapshot taken before the second add still has one handler.
        first.call(&mut Ctx).await.unwrap();
        assert_eq!(counter.count(), 1);
        second.call(&mut Ctx).await.unwrap();
        assert_eq!(counter.count(), 3);
    }

    #[tokio::test]
    async fn test_remove_recomposes() {
        let halting = HaltingHandler::new();
        let counter = CountingHandler::new();
        let mut registry = MiddlewareRegistry::<Ctx>::new();
        let gate = registry.add(Arc::new(halting.clone()));
        registry.add(Arc::new(counter.clone()));

        registry.composed().unwrap().call(&mut Ctx).await.unwrap();
        assert_eq!(counter.count(), 0);

        assert!(registry.remove(gate));
        assert!(!registry.remove(gate));
        registry.composed().unwrap().call(&mut Ctx).await.unwrap();
        assert_eq!(counter.count(), 1);
        assert_eq!(halting.count(), 1);
    }
}
