//! Connections: one peer inside one namespace.
//!
//! A connection is either *established* (it holds a transport [`Link`]) or a
//! *ghost*: a placeholder created for a peer that sent packets before its
//! handshake completed. Ghosts buffer and screen those packets until the
//! namespace promotes them.

use crate::{
    context::Context,
    error::{Error, Result},
    namespace::{Namespace, NamespaceShared},
};
use async_trait::async_trait;
use futures::FutureExt;
use sockway_core::{
    Ack, BoxError, BoxHandler, Chain, ChainError, Disposition, Handler, HandlerId, Link,
    LinkListener, Next, Packet, Payload,
};
use sockway_std::{ListenerRegistry, MiddlewareRegistry};
use std::{
    collections::{BTreeSet, HashSet},
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, error, info, trace, warn};

/// Event fired on a namespace when a peer completes its handshake.
pub const CONNECTION_EVENT: &str = "connection";

/// Event fired on a connection when its link terminates.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Whether `event` is reserved for lifecycle notifications.
///
/// Reserved events are never subscribed on a link and never accepted as
/// inbound packets.
pub fn is_reserved(event: &str) -> bool {
    event == CONNECTION_EVENT || event == DISCONNECT_EVENT
}

/// A packet received before the handshake, together with the peer id that
/// sent it.
#[derive(Debug, Clone)]
pub struct EarlyPacket {
    /// Peer id.
    pub id: String,
    /// The packet.
    pub packet: Packet,
}

impl EarlyPacket {
    /// Pair a packet with its sender.
    pub fn new(id: impl Into<String>, packet: Packet) -> Self {
        Self {
            id: id.into(),
            packet,
        }
    }
}

/// Result of running namespace middleware over a buffered packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screening {
    Pending,
    Passed,
    Halted,
    Failed,
}

/// Which stages a dispatch runs around the listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipeline {
    /// Every stage.
    Full,
    /// Everything except namespace middleware, which already ran.
    Screened,
    /// Listeners alone.
    ListenersOnly,
}

struct Buffered {
    packet: Packet,
    screening: Screening,
}

/// A buffered packet handed to the promoted connection.
pub(crate) enum Replay {
    /// Namespace middleware already passed it.
    Screened(Packet),
    /// Buffered but never screened.
    Unscreened(Packet),
}

pub(crate) struct ConnectionShared {
    id: String,
    path: String,
    namespace: Weak<NamespaceShared>,
    link: Option<Arc<dyn Link>>,
    context: tokio::sync::Mutex<Context>,
    middlewares: RwLock<MiddlewareRegistry<Context>>,
    listeners: RwLock<ListenerRegistry<Context>>,
    subscribed: Mutex<HashSet<String>>,
    buffered: Mutex<Vec<Buffered>>,
    closed: AtomicBool,
}

/// Handle to a connection. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<ConnectionShared>,
}

impl Connection {
    /// Create a connection in `namespace`.
    ///
    /// With a `link` the connection is established. With only an
    /// `early` packet it is a ghost that buffers that packet.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if neither is given, if both are given,
    /// or if the peer id is empty.
    pub fn create(
        namespace: &Namespace,
        link: Option<Arc<dyn Link>>,
        early: Option<EarlyPacket>,
    ) -> Result<Self> {
        let (id, buffered) = match (&link, early) {
            (None, None) => {
                return Err(Error::InvalidArgument(
                    "a connection needs a link or a pre-handshake packet".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidArgument(
                    "a link and a pre-handshake packet are exclusive".to_string(),
                ));
            }
            (Some(link), None) => (link.id().to_string(), Vec::new()),
            (None, Some(early)) => (
                early.id,
                vec![Buffered {
                    packet: early.packet,
                    screening: Screening::Pending,
                }],
            ),
        };
        if id.is_empty() {
            return Err(Error::InvalidArgument(
                "connection id must not be empty".to_string(),
            ));
        }

        let path = namespace.id().to_string();
        let ns = Arc::downgrade(namespace.shared());
        let shared = Arc::new_cyclic(|me| ConnectionShared {
            context: tokio::sync::Mutex::new(Context::new(
                id.clone(),
                path.clone(),
                link.clone(),
                ns.clone(),
                me.clone(),
            )),
            id,
            path,
            namespace: ns,
            link,
            middlewares: RwLock::new(MiddlewareRegistry::new()),
            listeners: RwLock::new(ListenerRegistry::new()),
            subscribed: Mutex::new(HashSet::new()),
            buffered: Mutex::new(buffered),
            closed: AtomicBool::new(false),
        });
        Ok(Self { shared })
    }

    pub(crate) fn from_shared(shared: Arc<ConnectionShared>) -> Self {
        Self { shared }
    }

    /// Peer id.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Path of the owning namespace.
    pub fn path(&self) -> &str {
        &self.shared.path
    }

    /// The owning namespace.
    pub fn namespace(&self) -> Option<Namespace> {
        self.shared.namespace.upgrade().map(Namespace::from_shared)
    }

    /// The transport link, absent for ghosts.
    pub fn link(&self) -> Option<Arc<dyn Link>> {
        self.shared.link.clone()
    }

    /// Whether this is a pre-handshake placeholder.
    pub fn is_ghost(&self) -> bool {
        self.shared.link.is_none()
    }

    /// Whether the link reported termination.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same connection.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Number of packets buffered while the handshake is pending.
    pub fn buffered_count(&self) -> usize {
        self.shared.buffered.lock().unwrap().len()
    }

    /// Events currently subscribed on the link.
    pub fn subscribed_events(&self) -> BTreeSet<String> {
        self.shared.subscribed.lock().unwrap().iter().cloned().collect()
    }

    /// Run `f` with exclusive access to the connection's context.
    ///
    /// Waits for any chain currently running on this connection.
    pub async fn with_context<R>(&self, f: impl FnOnce(&mut Context) -> R) -> R {
        let mut ctx = self.shared.context.lock().await;
        f(&mut ctx)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Add middleware that runs for this connection only, after the
    /// namespace middleware.
    pub fn middleware(&self, handler: impl Handler<Context>) -> HandlerId {
        let id = self
            .shared
            .middlewares
            .write()
            .unwrap()
            .add(Arc::new(handler));
        debug!(connection = %self.id(), namespace = %self.path(), "connection middleware added");
        id
    }

    /// Remove connection middleware by id.
    pub fn remove_middleware(&self, id: HandlerId) -> bool {
        self.shared.middlewares.write().unwrap().remove(id)
    }

    /// Add a listener for `event` on this connection only. It runs after the
    /// namespace's listeners for the same event.
    pub fn on(&self, event: impl Into<String>, handler: impl Handler<Context>) -> HandlerId {
        let event = event.into();
        let (id, first) = self
            .shared
            .listeners
            .write()
            .unwrap()
            .add(event.clone(), Arc::new(handler));
        if first {
            self.refresh_subscription(&event);
        }
        id
    }

    /// Remove one listener of `event`, or all of them when `id` is `None`.
    /// Removing something that is not registered does nothing.
    pub fn off(&self, event: &str, id: Option<HandlerId>) {
        let emptied = self.shared.listeners.write().unwrap().remove(event, id);
        if emptied {
            self.refresh_subscription(event);
        }
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Send an event to this peer. Returns `false` for ghosts.
    pub fn emit(&self, event: &str, payload: impl Into<Payload>) -> bool {
        match &self.shared.link {
            Some(link) => {
                link.emit(event, payload.into());
                true
            }
            None => false,
        }
    }

    /// Send an event to every other peer of the namespace. Returns `false`
    /// for ghosts.
    pub fn broadcast(&self, event: &str, payload: impl Into<Payload>) -> bool {
        match &self.shared.link {
            Some(link) => {
                link.broadcast(event, payload.into());
                true
            }
            None => false,
        }
    }

    /// Ask the transport to terminate the link.
    ///
    /// Cleanup happens when the transport reports the disconnect. Ghosts
    /// have no link and ignore this.
    pub fn disconnect(&self) {
        match &self.shared.link {
            Some(link) => link.disconnect(),
            None => debug!(connection = %self.id(), "ghost has no link to disconnect"),
        }
    }

    /// Bind this connection to its link: packets and termination are
    /// routed here, and every event with a listener (on the namespace or on
    /// this connection) is subscribed.
    pub fn subscribe_to_transport_events(&self) {
        let Some(link) = &self.shared.link else {
            return;
        };
        link.bind(Arc::new(LinkBinding {
            connection: Arc::downgrade(&self.shared),
        }));

        let mut events = self.shared.listeners.read().unwrap().events();
        if let Some(ns) = self.shared.namespace.upgrade() {
            events.extend(ns.listeners.read().unwrap().events());
        }
        for event in &events {
            self.refresh_subscription(event);
        }
    }

    /// Bring the link subscription for `event` in line with the registries.
    ///
    /// Subscribes when some listener exists and unsubscribes when none is
    /// left. Each transition reaches the link exactly once.
    pub(crate) fn refresh_subscription(&self, event: &str) {
        let Some(link) = &self.shared.link else {
            return;
        };
        if is_reserved(event) || self.is_closed() {
            return;
        }
        let wanted = self.shared.listeners.read().unwrap().contains(event)
            || self
                .shared
                .namespace
                .upgrade()
                .is_some_and(|ns| ns.listeners.read().unwrap().contains(event));

        let mut subscribed = self.shared.subscribed.lock().unwrap();
        if wanted && subscribed.insert(event.to_string()) {
            trace!(connection = %self.id(), event, "subscribing");
            link.subscribe(event);
        } else if !wanted && subscribed.remove(event) {
            trace!(connection = %self.id(), event, "unsubscribing");
            link.unsubscribe(event);
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Hook for every packet the link delivers.
    pub async fn receive(&self, packet: Packet) {
        if is_reserved(&packet.event) {
            warn!(
                connection = %self.id(),
                namespace = %self.path(),
                event = %packet.event,
                "peer sent a reserved event; dropped"
            );
            return;
        }
        self.dispatch(&packet.event, packet.data, packet.ack).await;
    }

    /// Run `event` through namespace middleware, connection middleware,
    /// listeners (namespace first, then connection-local) and postware.
    ///
    /// Without any listener for `event` nothing runs. Failures are reported
    /// here and never reach the caller.
    pub async fn dispatch(&self, event: &str, data: Payload, ack: Option<Ack>) {
        self.run(event, data, ack, Pipeline::Full).await;
    }

    /// Fire the `connection` listeners with the peer id as data. Middleware
    /// and postware are not involved.
    pub(crate) async fn announce(&self) {
        let id = Payload::String(self.id().to_string());
        self.run(CONNECTION_EVENT, id, None, Pipeline::ListenersOnly)
            .await;
    }

    async fn run(&self, event: &str, data: Payload, ack: Option<Ack>, pipeline: Pipeline) {
        let mut ctx = self.shared.context.lock().await;
        let Some(stages) = self.stages(event, pipeline) else {
            trace!(connection = %self.id(), namespace = %self.path(), event, "no listeners");
            return;
        };
        ctx.load(event, data, ack);

        let next = stages
            .iter()
            .rev()
            .fold(Next::empty(), |after, chain| chain.next().then(after));
        match AssertUnwindSafe(next.run(&mut *ctx)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.report(event, ChainError::Failed(err)),
            Err(panic) => self.report(event, ChainError::from_panic(panic)),
        }
    }

    /// Snapshot the chains for `event`, or `None` if nobody listens.
    fn stages(&self, event: &str, pipeline: Pipeline) -> Option<Vec<Chain<Context>>> {
        let ns = self.shared.namespace.upgrade();
        let shared_listeners = ns
            .as_ref()
            .and_then(|ns| ns.listeners.read().unwrap().get(event));
        let local_listeners = self.shared.listeners.read().unwrap().get(event);
        if shared_listeners.is_none() && local_listeners.is_none() {
            return None;
        }

        let mut stages = Vec::with_capacity(5);
        if pipeline == Pipeline::ListenersOnly {
            stages.extend(shared_listeners);
            stages.extend(local_listeners);
            return Some(stages);
        }
        if pipeline == Pipeline::Full {
            if let Some(ns) = &ns {
                stages.extend(ns.middlewares.read().unwrap().composed());
            }
        }
        stages.extend(self.shared.middlewares.read().unwrap().composed());
        stages.extend(shared_listeners);
        stages.extend(local_listeners);
        if let Some(ns) = &ns {
            stages.extend(ns.postwares.read().unwrap().composed());
        }
        Some(stages)
    }

    fn report(&self, event: &str, err: ChainError) {
        match err.disposition() {
            Disposition::DiagnosticOnly => {
                debug!(connection = %self.id(), namespace = %self.path(), event, error = %err, "chain stopped");
            }
            Disposition::Reported => {
                error!(connection = %self.id(), namespace = %self.path(), event, error = %err, "chain failed");
            }
            Disposition::ProgrammingError => {
                error!(
                    connection = %self.id(),
                    namespace = %self.path(),
                    event,
                    error = %err,
                    "non-error value reached the dispatch boundary; this is a bug in a handler"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Ghosts
    // ------------------------------------------------------------------

    /// Buffer a pre-handshake packet. Returns `false` when the buffer is full.
    pub(crate) fn buffer(&self, packet: Packet, max: usize) -> bool {
        let mut buffered = self.shared.buffered.lock().unwrap();
        if buffered.len() >= max {
            warn!(
                connection = %self.id(),
                namespace = %self.path(),
                event = %packet.event,
                max,
                "pre-handshake buffer full; packet dropped"
            );
            return false;
        }
        buffered.push(Buffered {
            packet,
            screening: Screening::Pending,
        });
        true
    }

    /// Run namespace middleware over every buffered packet not yet screened.
    pub(crate) async fn screen_buffered(&self) {
        let mut ctx = self.shared.context.lock().await;
        loop {
            let next = {
                let buffered = self.shared.buffered.lock().unwrap();
                buffered
                    .iter()
                    .position(|b| b.screening == Screening::Pending)
                    .map(|index| (index, buffered[index].packet.clone()))
            };
            let Some((index, packet)) = next else {
                break;
            };
            let screening = self.screen(&mut *ctx, packet).await;
            if let Some(entry) = self.shared.buffered.lock().unwrap().get_mut(index) {
                entry.screening = screening;
            }
        }
    }

    async fn screen(&self, ctx: &mut Context, packet: Packet) -> Screening {
        let chain = self
            .shared
            .namespace
            .upgrade()
            .and_then(|ns| ns.middlewares.read().unwrap().composed());
        let Some(chain) = chain else {
            return Screening::Passed;
        };

        let event = packet.event.clone();
        ctx.load(&packet.event, packet.data, packet.ack);
        let reached = Arc::new(AtomicBool::new(false));
        let terminal: [BoxHandler<Context>; 1] = [Arc::new(Reached(reached.clone()))];
        let next = chain.next().then(Next::new(&terminal));

        match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
            Ok(Ok(())) if reached.load(Ordering::SeqCst) => Screening::Passed,
            Ok(Ok(())) => {
                debug!(connection = %self.id(), namespace = %self.path(), event = %event, "pre-handshake packet halted");
                Screening::Halted
            }
            Ok(Err(err)) => {
                self.report(&event, ChainError::Failed(err));
                Screening::Failed
            }
            Err(panic) => {
                self.report(&event, ChainError::from_panic(panic));
                Screening::Failed
            }
        }
    }

    /// Take over a ghost's state and buffered packets.
    ///
    /// Waits for the ghost to finish screening. Packets that were halted or
    /// failed are dropped.
    pub(crate) async fn adopt(&self, ghost: &Connection) -> Vec<Replay> {
        let ghost_ctx = ghost.shared.context.lock().await;
        self.shared.context.lock().await.state = ghost_ctx.state.clone();
        let buffered = std::mem::take(&mut *ghost.shared.buffered.lock().unwrap());
        drop(ghost_ctx);

        buffered
            .into_iter()
            .filter_map(|b| match b.screening {
                Screening::Passed => Some(Replay::Screened(b.packet)),
                Screening::Pending => Some(Replay::Unscreened(b.packet)),
                Screening::Halted | Screening::Failed => {
                    trace!(connection = %self.id(), event = %b.packet.event, "dropping screened-out packet");
                    None
                }
            })
            .collect()
    }

    /// Dispatch a packet taken over from a ghost.
    pub(crate) async fn replay(&self, replay: Replay) {
        match replay {
            Replay::Screened(packet) => {
                self.run(&packet.event, packet.data, packet.ack, Pipeline::Screened)
                    .await;
            }
            Replay::Unscreened(packet) => self.receive(packet).await,
        }
    }

    /// Handle link termination: fire `disconnect` listeners with the reason,
    /// then leave the namespace. Runs once.
    pub(crate) async fn on_disconnect(&self, reason: &str) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.dispatch(DISCONNECT_EVENT, Payload::String(reason.to_string()), None)
            .await;
        self.shared.subscribed.lock().unwrap().clear();
        if let Some(ns) = self.namespace() {
            ns.on_disconnect(self.id());
        }
        info!(connection = %self.id(), namespace = %self.path(), reason, "connection closed");
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("path", &self.shared.path)
            .field("ghost", &self.is_ghost())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Terminal stage used while screening: records that every middleware
/// called `next`.
struct Reached(Arc<AtomicBool>);

#[async_trait]
impl Handler<Context> for Reached {
    async fn handle(&self, _ctx: &mut Context, _next: Next<'_, Context>) -> Result<(), BoxError> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct LinkBinding {
    connection: Weak<ConnectionShared>,
}

#[async_trait]
impl LinkListener for LinkBinding {
    async fn on_packet(&self, packet: Packet) {
        if let Some(shared) = self.connection.upgrade() {
            Connection::from_shared(shared).receive(packet).await;
        }
    }

    async fn on_disconnect(&self, reason: &str) {
        if let Some(shared) = self.connection.upgrade() {
            Connection::from_shared(shared).on_disconnect(reason).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn namespace() -> Namespace {
        Namespace::new("/", Arc::new(ServerConfig::default()))
    }

    #[test]
    fn test_create_requires_link_or_packet() {
        let err = Connection::create(&namespace(), None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_create_rejects_empty_id() {
        let early = EarlyPacket::new("", Packet::new("x", 1));
        let err = Connection::create(&namespace(), None, Some(early)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_ghost_buffers_packet() {
        let early = EarlyPacket::new("abc", Packet::new("x", 1));
        let ghost = Connection::create(&namespace(), None, Some(early)).unwrap();
        assert!(ghost.is_ghost());
        assert_eq!(ghost.id(), "abc");
        assert_eq!(ghost.buffered_count(), 1);
        assert!(!ghost.emit("y", 2));
    }

    #[test]
    fn test_buffer_bound() {
        let early = EarlyPacket::new("abc", Packet::new("x", 1));
        let ghost = Connection::create(&namespace(), None, Some(early)).unwrap();
        assert!(ghost.buffer(Packet::new("x", 2), 2));
        assert!(!ghost.buffer(Packet::new("x", 3), 2));
        assert_eq!(ghost.buffered_count(), 2);
    }

    #[test]
    fn test_reserved_events() {
        assert!(is_reserved("connection"));
        assert!(is_reserved("disconnect"));
        assert!(!is_reserved("message"));
    }
}
