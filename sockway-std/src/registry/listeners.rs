//! Per-event listener registry.

use sockway_core::{BoxHandler, Chain, HandlerId};
use std::collections::{BTreeSet, HashMap};

/// Listeners grouped by event name, each group composed into one [`Chain`].
///
/// Adding the first listener of an event and removing the last one are
/// reported to the caller, which uses them to subscribe to and unsubscribe
/// from the event on the transport.
pub struct ListenerRegistry<C> {
    by_event: HashMap<String, Vec<(HandlerId, BoxHandler<C>)>>,
    composed: HashMap<String, Chain<C>>,
}

impl<C: Send + 'static> ListenerRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_event: HashMap::new(),
            composed: HashMap::new(),
        }
    }

    /// Register a listener under a fresh id.
    ///
    /// Returns the id and whether this is the first listener for `event`.
    pub fn add(&mut self, event: impl Into<String>, handler: BoxHandler<C>) -> (HandlerId, bool) {
        let id = HandlerId::next();
        let first = self.insert(event, id, handler);
        (id, first)
    }

    /// Register a listener under an existing id.
    ///
    /// Returns whether this is the first listener for `event`.
    pub fn insert(&mut self, event: impl Into<String>, id: HandlerId, handler: BoxHandler<C>) -> bool {
        let event = event.into();
        let list = self.by_event.entry(event.clone()).or_default();
        let first = list.is_empty();
        list.push((id, handler));
        self.recompose(&event);
        first
    }

    /// Remove one listener (`Some(id)`) or every listener (`None`) of `event`.
    ///
    /// Returns `true` only when the event went from having listeners to
    /// having none. Removing something that is not registered returns `false`
    /// and changes nothing.
    pub fn remove(&mut self, event: &str, id: Option<HandlerId>) -> bool {
        let Some(list) = self.by_event.get_mut(event) else {
            return false;
        };

        match id {
            Some(id) => {
                let before = list.len();
                list.retain(|(entry, _)| *entry != id);
                if list.len() == before {
                    return false;
                }
                if list.is_empty() {
                    self.by_event.remove(event);
                    self.composed.remove(event);
                    true
                } else {
                    self.recompose(event);
                    false
                }
            }
            None => {
                self.by_event.remove(event);
                self.composed.remove(event);
                true
            }
        }
    }

    /// Remove every listener, returning the events that had any.
    pub fn clear(&mut self) -> Vec<String> {
        self.composed.clear();
        let mut events: Vec<String> = self.by_event.drain().map(|(event, _)| event).collect();
        events.sort();
        events
    }

    /// The composed chain for `event`.
    pub fn get(&self, event: &str) -> Option<Chain<C>> {
        self.composed.get(event).cloned()
    }

    /// Whether `event` has at least one listener.
    pub fn contains(&self, event: &str) -> bool {
        self.composed.contains_key(event)
    }

    /// Names of every event with listeners.
    pub fn events(&self) -> BTreeSet<String> {
        self.by_event.keys().cloned().collect()
    }

    /// Number of listeners registered for `event`.
    pub fn count(&self, event: &str) -> usize {
        self.by_event.get(event).map_or(0, Vec::len)
    }

    /// Number of events with listeners.
    pub fn len(&self) -> usize {
        self.by_event.len()
    }

    /// Whether no event has listeners.
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }

    fn recompose(&mut self, event: &str) {
        match self.by_event.get(event) {
            Some(list) if !list.is_empty() => {
                let chain = Chain::compose(list.iter().map(|(_, h)| h.clone()));
                self.composed.insert(event.to_string(), chain);
            }
            _ => {
                self.composed.remove(event);
            }
        }
    }
}

impl<C: Send + 'static> Default for ListenerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::OrderRecordingHandler;
    use std::sync::{Arc, Mutex};

    struct Ctx;

    fn recorder(id: usize, order: &Arc<Mutex<Vec<usize>>>) -> BoxHandler<Ctx> {
        Arc::new(OrderRecordingHandler {
            id,
            order: order.clone(),
        })
    }

    #[tokio::test]
    async fn test_composes_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();

        let (_, first) = registry.add("ping", recorder(1, &order));
        assert!(first);
        let (_, first) = registry.add("ping", recorder(2, &order));
        assert!(!first);
        registry.add("ping", recorder(3, &order));

        let chain = registry.get("ping").unwrap();
        chain.call(&mut Ctx).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_last_reports_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        let (id, _) = registry.add("ping", recorder(1, &order));

        assert!(registry.remove("ping", Some(id)));
        assert!(registry.get("ping").is_none());
        assert!(!registry.remove("ping", Some(id)));
        assert!(!registry.remove("ping", None));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_one_of_many_recomposes() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        let (a, _) = registry.add("ping", recorder(1, &order));
        registry.add("ping", recorder(2, &order));

        let before = registry.get("ping").unwrap();
        assert!(!registry.remove("ping", Some(a)));
        let after = registry.get("ping").unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 1);
        assert!(!before.ptr_eq(&after));
    }

    #[test]
    fn test_unrelated_events_survive() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.add("a", recorder(1, &order));
        registry.add("b", recorder(2, &order));
        let b = registry.get("b").unwrap();

        registry.remove("a", None);
        assert!(registry.get("b").unwrap().ptr_eq(&b));
        assert_eq!(registry.events().into_iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_clear_returns_events() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        registry.add("b", recorder(1, &order));
        registry.add("a", recorder(2, &order));

        assert_eq!(registry.clear(), vec!["a", "b"]);
        assert!(registry.is_empty());
        assert!(registry.clear().is_empty());
    }
}
