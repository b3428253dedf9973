//! The per-connection context threaded through every chain.

use crate::{
    connection::{Connection, ConnectionShared},
    namespace::{Namespace, NamespaceShared},
};
use sockway_core::{Ack, Link, Payload};
use std::{
    fmt,
    sync::{Arc, Weak},
};

/// Shared mutable state of one connection.
///
/// A connection owns exactly one `Context` and reuses it for every event:
/// the `event`, `data` and `ack` fields are overwritten per dispatch, while
/// `state` persists for the connection's lifetime. Every stage of a chain
/// (namespace middleware, connection middleware, listeners, postware) sees
/// the same instance.
pub struct Context {
    id: String,
    path: String,
    /// Name of the event being dispatched.
    pub event: String,
    /// Payload of the event being dispatched.
    pub data: Payload,
    /// Acknowledgement callback of the event being dispatched.
    pub ack: Option<Ack>,
    /// Application state kept across events.
    pub state: serde_json::Map<String, Payload>,
    link: Option<Arc<dyn Link>>,
    namespace: Weak<NamespaceShared>,
    connection: Weak<ConnectionShared>,
}

impl Context {
    pub(crate) fn new(
        id: String,
        path: String,
        link: Option<Arc<dyn Link>>,
        namespace: Weak<NamespaceShared>,
        connection: Weak<ConnectionShared>,
    ) -> Self {
        Self {
            id,
            path,
            event: String::new(),
            data: Payload::Null,
            ack: None,
            state: serde_json::Map::new(),
            link,
            namespace,
            connection,
        }
    }

    /// Connection id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Namespace path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The owning namespace.
    pub fn namespace(&self) -> Option<Namespace> {
        self.namespace.upgrade().map(Namespace::from_shared)
    }

    /// The owning connection, unless it has been dropped.
    pub fn connection(&self) -> Option<Connection> {
        self.connection.upgrade().map(Connection::from_shared)
    }

    /// Whether the handshake completed. `false` while screening a
    /// pre-handshake packet.
    pub fn is_established(&self) -> bool {
        self.link.is_some()
    }

    /// Send an event to this peer. Returns `false` before the handshake.
    pub fn emit(&self, event: &str, payload: impl Into<Payload>) -> bool {
        match &self.link {
            Some(link) => {
                link.emit(event, payload.into());
                true
            }
            None => false,
        }
    }

    /// Send an event to every other peer of the namespace. Returns `false`
    /// before the handshake.
    pub fn broadcast(&self, event: &str, payload: impl Into<Payload>) -> bool {
        match &self.link {
            Some(link) => {
                link.broadcast(event, payload.into());
                true
            }
            None => false,
        }
    }

    /// Answer the peer's acknowledgement callback, if it sent one.
    pub fn acknowledge(&self, payload: impl Into<Payload>) -> bool {
        match &self.ack {
            Some(ack) => {
                ack.send(payload.into());
                true
            }
            None => false,
        }
    }

    pub(crate) fn load(&mut self, event: &str, data: Payload, ack: Option<Ack>) {
        self.event.clear();
        self.event.push_str(event);
        self.data = data;
        self.ack = ack;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("event", &self.event)
            .field("data", &self.data)
            .field("established", &self.is_established())
            .finish()
    }
}
