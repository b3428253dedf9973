//! In-process transport.
//!
//! [`MemoryTransport`] implements the transport traits without any network.
//! Peers are simulated by calling [`MemoryChannel::connect`],
//! [`MemoryChannel::send`] and [`MemoryLink::close`]. Every command sockway
//! issues on a link is recorded as a [`LinkOp`] so it can be inspected.
//!
//! Like a real transport, a link only delivers events it was subscribed to.

use sockway_core::{Channel, ChannelListener, Link, LinkListener, Packet, Payload, Transport};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

/// Root path used for transport-wide broadcasts.
pub const ROOT_PATH: &str = "/";

// ============================================================================
// Transport
// ============================================================================

/// An in-process transport.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<TransportState>,
}

#[derive(Default)]
struct TransportState {
    channels: Mutex<HashMap<String, Arc<MemoryChannel>>>,
    emitted: Mutex<Vec<(String, Payload)>>,
}

impl MemoryTransport {
    /// Create a transport with no open channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel opened at `path`.
    pub fn channel(&self, path: &str) -> Option<Arc<MemoryChannel>> {
        self.inner.channels.lock().unwrap().get(path).cloned()
    }

    /// Paths of every opened channel.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.channels.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Root broadcasts issued so far.
    pub fn emitted(&self) -> Vec<(String, Payload)> {
        self.inner.emitted.lock().unwrap().clone()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, path: &str, listener: Arc<dyn ChannelListener>) -> Arc<dyn Channel> {
        let channel = MemoryChannel::new(path, listener);
        self.inner
            .channels
            .lock()
            .unwrap()
            .insert(path.to_string(), channel.clone());
        channel
    }

    fn emit(&self, event: &str, payload: Payload) {
        self.inner
            .emitted
            .lock()
            .unwrap()
            .push((event.to_string(), payload.clone()));
        if let Some(root) = self.channel(ROOT_PATH) {
            root.emit(event, payload);
        }
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("channels", &self.paths())
            .finish()
    }
}

// ============================================================================
// Channel
// ============================================================================

/// One opened channel of a [`MemoryTransport`].
pub struct MemoryChannel {
    path: String,
    listener: Arc<dyn ChannelListener>,
    links: Mutex<HashMap<String, Arc<MemoryLink>>>,
    emitted: Mutex<Vec<(String, Payload)>>,
    me: Weak<MemoryChannel>,
}

impl MemoryChannel {
    fn new(path: &str, listener: Arc<dyn ChannelListener>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            path: path.to_string(),
            listener,
            links: Mutex::new(HashMap::new()),
            emitted: Mutex::new(Vec::new()),
            me: me.clone(),
        })
    }

    /// Complete a peer's handshake and announce it to the channel listener.
    pub async fn connect(&self, id: &str) -> Arc<MemoryLink> {
        let link = Arc::new(MemoryLink::new(id, self.me.clone()));
        self.links
            .lock()
            .unwrap()
            .insert(id.to_string(), link.clone());
        self.listener.on_connection(link.clone()).await;
        link
    }

    /// Deliver a packet from peer `id`.
    ///
    /// Packets from peers whose handshake has not completed go to the channel
    /// listener's pre-handshake hook. Returns whether anything received it.
    pub async fn send(&self, id: &str, packet: Packet) -> bool {
        let link = self.link(id);
        match link {
            Some(link) => link.deliver(packet).await,
            None => {
                self.listener.on_pre_handshake(id, packet).await;
                true
            }
        }
    }

    /// The connected link with the given id.
    pub fn link(&self, id: &str) -> Option<Arc<MemoryLink>> {
        self.links.lock().unwrap().get(id).cloned()
    }

    /// Broadcasts issued on this channel.
    pub fn emitted(&self) -> Vec<(String, Payload)> {
        self.emitted.lock().unwrap().clone()
    }

    fn peers(&self) -> Vec<Arc<MemoryLink>> {
        self.links.lock().unwrap().values().cloned().collect()
    }

    fn detach(&self, id: &str) {
        self.links.lock().unwrap().remove(id);
    }
}

impl Channel for MemoryChannel {
    fn path(&self) -> &str {
        &self.path
    }

    fn emit(&self, event: &str, payload: Payload) {
        self.emitted
            .lock()
            .unwrap()
            .push((event.to_string(), payload.clone()));
        for peer in self.peers() {
            peer.push_inbox(event, payload.clone());
        }
    }
}

// ============================================================================
// Link
// ============================================================================

/// A command sockway issued on a [`MemoryLink`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOp {
    /// `subscribe(event)`
    Subscribe(String),
    /// `unsubscribe(event)`
    Unsubscribe(String),
    /// `emit(event, payload)`
    Emit(String, Payload),
    /// `broadcast(event, payload)`
    Broadcast(String, Payload),
    /// `disconnect()`
    Disconnect,
}

/// A simulated peer link.
pub struct MemoryLink {
    id: String,
    channel: Weak<MemoryChannel>,
    listener: Mutex<Option<Arc<dyn LinkListener>>>,
    subscriptions: Mutex<HashSet<String>>,
    ops: Mutex<Vec<LinkOp>>,
    inbox: Mutex<Vec<(String, Payload)>>,
    disconnect_requested: AtomicBool,
}

impl MemoryLink {
    fn new(id: &str, channel: Weak<MemoryChannel>) -> Self {
        Self {
            id: id.to_string(),
            channel,
            listener: Mutex::new(None),
            subscriptions: Mutex::new(HashSet::new()),
            ops: Mutex::new(Vec::new()),
            inbox: Mutex::new(Vec::new()),
            disconnect_requested: AtomicBool::new(false),
        }
    }

    /// Deliver an inbound packet. Unsubscribed events are dropped.
    pub async fn deliver(&self, packet: Packet) -> bool {
        if !self.is_subscribed(&packet.event) {
            return false;
        }
        let listener = self.listener.lock().unwrap().clone();
        match listener {
            Some(listener) => {
                listener.on_packet(packet).await;
                true
            }
            None => false,
        }
    }

    /// Terminate the link from the transport side and notify the listener.
    pub async fn close(&self, reason: &str) {
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(&self.id);
        }
        self.subscriptions.lock().unwrap().clear();
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_disconnect(reason).await;
        }
    }

    /// Whether `event` is currently delivered.
    pub fn is_subscribed(&self, event: &str) -> bool {
        self.subscriptions.lock().unwrap().contains(event)
    }

    /// Every command issued on this link, in order.
    pub fn ops(&self) -> Vec<LinkOp> {
        self.ops.lock().unwrap().clone()
    }

    /// How many times `event` was subscribed.
    pub fn subscribe_count(&self, event: &str) -> usize {
        self.count(|op| matches!(op, LinkOp::Subscribe(e) if e == event))
    }

    /// How many times `event` was unsubscribed.
    pub fn unsubscribe_count(&self, event: &str) -> usize {
        self.count(|op| matches!(op, LinkOp::Unsubscribe(e) if e == event))
    }

    /// Events this peer received, through emits and broadcasts alike.
    pub fn received(&self) -> Vec<(String, Payload)> {
        self.inbox.lock().unwrap().clone()
    }

    /// Whether sockway asked for this link to be terminated.
    pub fn disconnect_requested(&self) -> bool {
        self.disconnect_requested.load(Ordering::SeqCst)
    }

    fn count(&self, pred: impl Fn(&LinkOp) -> bool) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| pred(op)).count()
    }

    fn record(&self, op: LinkOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn push_inbox(&self, event: &str, payload: Payload) {
        self.inbox
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
    }
}

impl Link for MemoryLink {
    fn id(&self) -> &str {
        &self.id
    }

    fn bind(&self, listener: Arc<dyn LinkListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    fn subscribe(&self, event: &str) {
        self.subscriptions.lock().unwrap().insert(event.to_string());
        self.record(LinkOp::Subscribe(event.to_string()));
    }

    fn unsubscribe(&self, event: &str) {
        self.subscriptions.lock().unwrap().remove(event);
        self.record(LinkOp::Unsubscribe(event.to_string()));
    }

    fn emit(&self, event: &str, payload: Payload) {
        self.record(LinkOp::Emit(event.to_string(), payload.clone()));
        self.push_inbox(event, payload);
    }

    fn broadcast(&self, event: &str, payload: Payload) {
        self.record(LinkOp::Broadcast(event.to_string(), payload.clone()));
        if let Some(channel) = self.channel.upgrade() {
            for peer in channel.peers() {
                if peer.id != self.id {
                    peer.push_inbox(event, payload.clone());
                }
            }
        }
    }

    fn disconnect(&self) {
        self.disconnect_requested.store(true, Ordering::SeqCst);
        self.record(LinkOp::Disconnect);
    }
}

impl fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLink").field("id", &self.id).finish()
    }
}
