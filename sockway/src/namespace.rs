//! Namespaces: shared middleware, postware and listeners for a group of
//! connections.

use crate::{
    config::ServerConfig,
    connection::{Connection, EarlyPacket},
    context::Context,
    error::{Error, Result},
};
use async_trait::async_trait;
use sockway_core::{
    BoxHandler, Channel, ChannelListener, Handler, HandlerId, Link, Packet, Payload, Transport,
};
use sockway_std::{ListenerRegistry, MiddlewareRegistry};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, RwLock, Weak},
};
use tracing::{debug, info, warn};

pub(crate) struct NamespaceShared {
    id: String,
    config: Arc<ServerConfig>,
    pub(crate) middlewares: RwLock<MiddlewareRegistry<Context>>,
    pub(crate) postwares: RwLock<MiddlewareRegistry<Context>>,
    pub(crate) listeners: RwLock<ListenerRegistry<Context>>,
    // Lock order: `connections` before `ghosts`.
    connections: RwLock<HashMap<String, Connection>>,
    ghosts: Mutex<HashMap<String, Connection>>,
    channel: RwLock<Option<Arc<dyn Channel>>>,
}

/// Handle to a namespace. Cloning is cheap; clones share state.
///
/// Middleware, postware and listeners registered here apply to every
/// connection of the namespace, including connections that already exist:
/// connections read these registries each time they dispatch.
#[derive(Clone)]
pub struct Namespace {
    shared: Arc<NamespaceShared>,
}

enum Route {
    Live(Connection, Packet),
    Ghost(Connection),
    Dropped,
}

impl Namespace {
    pub(crate) fn new(id: impl Into<String>, config: Arc<ServerConfig>) -> Self {
        Self {
            shared: Arc::new(NamespaceShared {
                id: id.into(),
                config,
                middlewares: RwLock::new(MiddlewareRegistry::new()),
                postwares: RwLock::new(MiddlewareRegistry::new()),
                listeners: RwLock::new(ListenerRegistry::new()),
                connections: RwLock::new(HashMap::new()),
                ghosts: Mutex::new(HashMap::new()),
                channel: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<NamespaceShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<NamespaceShared> {
        &self.shared
    }

    /// Namespace path, always starting with `/`.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Whether a transport channel is open.
    pub fn is_started(&self) -> bool {
        self.shared.channel.read().unwrap().is_some()
    }

    /// Whether two handles refer to the same namespace.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Open this namespace's channel on `transport`.
    ///
    /// Events are subscribed per connection as peers arrive.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] if a channel is already open.
    pub fn start(&self, transport: &dyn Transport) -> Result<()> {
        if self.try_start(transport) {
            Ok(())
        } else {
            Err(Error::AlreadyStarted(format!("namespace {}", self.id())))
        }
    }

    /// Start unless already started. Returns whether this call started it.
    pub(crate) fn try_start(&self, transport: &dyn Transport) -> bool {
        let mut channel = self.shared.channel.write().unwrap();
        if channel.is_some() {
            return false;
        }
        let listener = Arc::new(ChannelBinding {
            namespace: Arc::downgrade(&self.shared),
        });
        *channel = Some(transport.open(self.id(), listener));
        info!(namespace = %self.id(), "namespace started");
        true
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Add middleware. It runs before listeners, for every event of every
    /// connection, in registration order.
    pub fn middleware(&self, handler: impl Handler<Context>) -> HandlerId {
        let id = HandlerId::next();
        self.insert_middleware(id, Arc::new(handler));
        id
    }

    pub(crate) fn insert_middleware(&self, id: HandlerId, handler: BoxHandler<Context>) {
        self.shared.middlewares.write().unwrap().insert(id, handler);
        debug!(namespace = %self.id(), "middleware added");
    }

    /// Add postware. It runs after listeners that call `next`.
    pub fn post(&self, handler: impl Handler<Context>) -> HandlerId {
        let id = HandlerId::next();
        self.insert_post(id, Arc::new(handler));
        id
    }

    pub(crate) fn insert_post(&self, id: HandlerId, handler: BoxHandler<Context>) {
        self.shared.postwares.write().unwrap().insert(id, handler);
        debug!(namespace = %self.id(), "postware added");
    }

    /// Remove middleware or postware by id.
    pub fn remove_middleware(&self, id: HandlerId) -> bool {
        let removed = self.shared.middlewares.write().unwrap().remove(id);
        removed || self.shared.postwares.write().unwrap().remove(id)
    }

    /// Add a listener for `event`.
    ///
    /// The first listener of an event subscribes it on every connection.
    pub fn on(&self, event: impl Into<String>, handler: impl Handler<Context>) -> HandlerId {
        let id = HandlerId::next();
        self.insert_listener(event.into(), id, Arc::new(handler));
        id
    }

    pub(crate) fn insert_listener(&self, event: String, id: HandlerId, handler: BoxHandler<Context>) {
        let first = self
            .shared
            .listeners
            .write()
            .unwrap()
            .insert(event.clone(), id, handler);
        debug!(namespace = %self.id(), event = %event, first, "listener added");
        if first {
            self.refresh_subscriptions(&event);
        }
    }

    /// Remove one listener of `event`, or all of them when `id` is `None`.
    ///
    /// When no listener is left the event is unsubscribed on every
    /// connection that has no local listener for it. Removing something
    /// that is not registered does nothing.
    pub fn off(&self, event: &str, id: Option<HandlerId>) {
        let emptied = self.shared.listeners.write().unwrap().remove(event, id);
        if emptied {
            debug!(namespace = %self.id(), event, "last listener removed");
            self.refresh_subscriptions(event);
        }
    }

    /// Remove every listener of every event.
    pub fn off_all(&self) {
        let events = self.shared.listeners.write().unwrap().clear();
        for event in &events {
            self.refresh_subscriptions(event);
        }
    }

    /// Events with at least one namespace listener.
    pub fn events(&self) -> Vec<String> {
        self.shared
            .listeners
            .read()
            .unwrap()
            .events()
            .into_iter()
            .collect()
    }

    fn refresh_subscriptions(&self, event: &str) {
        for connection in self.connections() {
            connection.refresh_subscription(event);
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Broadcast an event to every peer. Does nothing before `start`.
    pub fn emit(&self, event: &str, payload: impl Into<Payload>) {
        let channel = self.shared.channel.read().unwrap().clone();
        match channel {
            Some(channel) => channel.emit(event, payload.into()),
            None => debug!(namespace = %self.id(), event, "namespace not started; emit ignored"),
        }
    }

    /// The established connection with id `id`.
    pub fn connection(&self, id: &str) -> Option<Connection> {
        self.shared.connections.read().unwrap().get(id).cloned()
    }

    /// All established connections.
    pub fn connections(&self) -> Vec<Connection> {
        self.shared
            .connections
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect()
    }

    /// Number of established connections.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.read().unwrap().len()
    }

    /// The ghost for peer `id`, if its handshake is still pending.
    pub fn ghost(&self, id: &str) -> Option<Connection> {
        self.shared.ghosts.lock().unwrap().get(id).cloned()
    }

    /// Number of ghosts.
    pub fn ghost_count(&self) -> usize {
        self.shared.ghosts.lock().unwrap().len()
    }

    /// Handle a packet sent by peer `id` before its handshake completed.
    ///
    /// If the peer meanwhile connected, the packet goes to its connection.
    /// Otherwise it is buffered on the peer's ghost (created on first use)
    /// and screened by namespace middleware.
    ///
    /// Screening runs namespace middleware for every buffered packet, even
    /// when its event has no listener, so middleware can prepare the
    /// connection's state before the handshake. An established connection
    /// skips events without listeners entirely.
    ///
    /// At most [`ServerConfig::max_ghosts`] ghosts exist per namespace.
    /// Packets from further unknown peers are dropped.
    pub async fn on_pre_handshake_packet(&self, id: &str, packet: Packet) {
        let route = {
            let connections = self.shared.connections.read().unwrap();
            if let Some(connection) = connections.get(id) {
                Route::Live(connection.clone(), packet)
            } else {
                let mut ghosts = self.shared.ghosts.lock().unwrap();
                if let Some(ghost) = ghosts.get(id) {
                    if ghost.buffer(packet, self.shared.config.max_pending_packets) {
                        Route::Ghost(ghost.clone())
                    } else {
                        Route::Dropped
                    }
                } else if ghosts.len() >= self.shared.config.max_ghosts {
                    warn!(
                        namespace = %self.id(),
                        connection = %id,
                        max = self.shared.config.max_ghosts,
                        "too many pending handshakes; packet dropped"
                    );
                    Route::Dropped
                } else {
                    match Connection::create(self, None, Some(EarlyPacket::new(id, packet))) {
                        Ok(ghost) => {
                            debug!(namespace = %self.id(), connection = %id, "ghost created");
                            ghosts.insert(id.to_string(), ghost.clone());
                            Route::Ghost(ghost)
                        }
                        Err(err) => {
                            warn!(namespace = %self.id(), error = %err, "pre-handshake packet rejected");
                            Route::Dropped
                        }
                    }
                }
            }
        };

        match route {
            Route::Live(connection, packet) => connection.receive(packet).await,
            Route::Ghost(ghost) => ghost.screen_buffered().await,
            Route::Dropped => {}
        }
    }

    /// Handle a completed handshake.
    ///
    /// Replaces the peer's ghost (if any) with an established connection
    /// that keeps the ghost's state, fires the `connection` listeners with
    /// the peer id as data, dispatches the buffered packets that passed
    /// screening, then subscribes the connection to its events.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the link has an empty id.
    pub async fn on_connection(&self, link: Arc<dyn Link>) -> Result<Connection> {
        let connection = Connection::create(self, Some(link), None)?;
        let id = connection.id().to_string();

        let ghost = {
            let mut connections = self.shared.connections.write().unwrap();
            let ghost = self.shared.ghosts.lock().unwrap().remove(&id);
            if connections.insert(id.clone(), connection.clone()).is_some() {
                warn!(namespace = %self.id(), connection = %id, "replaced an existing connection");
            }
            ghost
        };

        let replay = match &ghost {
            Some(ghost) => connection.adopt(ghost).await,
            None => Vec::new(),
        };
        info!(
            namespace = %self.id(),
            connection = %id,
            promoted = ghost.is_some(),
            replayed = replay.len(),
            "connection established"
        );

        connection.announce().await;
        for packet in replay {
            connection.replay(packet).await;
        }
        connection.subscribe_to_transport_events();
        Ok(connection)
    }

    /// Forget connection `id`. Returns whether it was present.
    pub fn on_disconnect(&self, id: &str) -> bool {
        let removed = self.shared.connections.write().unwrap().remove(id);
        match removed {
            Some(_) => {
                debug!(namespace = %self.id(), connection = %id, "connection removed");
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("id", &self.shared.id)
            .field("started", &self.is_started())
            .field("connections", &self.connection_count())
            .finish()
    }
}

struct ChannelBinding {
    namespace: Weak<NamespaceShared>,
}

#[async_trait]
impl ChannelListener for ChannelBinding {
    async fn on_connection(&self, link: Arc<dyn Link>) {
        let Some(shared) = self.namespace.upgrade() else {
            return;
        };
        let namespace = Namespace::from_shared(shared);
        if let Err(err) = namespace.on_connection(link).await {
            warn!(namespace = %namespace.id(), error = %err, "link rejected");
        }
    }

    async fn on_pre_handshake(&self, id: &str, packet: Packet) {
        if let Some(shared) = self.namespace.upgrade() {
            Namespace::from_shared(shared)
                .on_pre_handshake_packet(id, packet)
                .await;
        }
    }
}
