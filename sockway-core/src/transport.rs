//! # Transport Boundary
//!
//! The traits a real-time transport implements to host sockway namespaces.
//!
//! The transport owns framing, heartbeats and reconnection. sockway only needs
//! to open named channels on it, learn about new links and inbound packets,
//! and push events back out.
//!
//! Notifications flow into sockway through [`ChannelListener`] and
//! [`LinkListener`]; commands flow out through [`Transport`], [`Channel`] and
//! [`Link`].

use crate::message::{Packet, Payload};
use async_trait::async_trait;
use std::sync::Arc;

/// A listenable real-time server.
pub trait Transport: Send + Sync + 'static {
    /// Open (or attach to) the channel at `path`.
    ///
    /// Notifications for the channel are delivered to `listener`.
    fn open(&self, path: &str, listener: Arc<dyn ChannelListener>) -> Arc<dyn Channel>;

    /// Broadcast on the transport root.
    fn emit(&self, event: &str, payload: Payload);
}

/// A named sub-channel multiplexed over the physical connections.
pub trait Channel: Send + Sync + 'static {
    /// The channel path.
    fn path(&self) -> &str;

    /// Broadcast to every link in the channel.
    fn emit(&self, event: &str, payload: Payload);
}

/// One peer's link inside a channel.
pub trait Link: Send + Sync + 'static {
    /// Identifier of the peer.
    fn id(&self) -> &str;

    /// Route this link's inbound notifications to `listener`.
    fn bind(&self, listener: Arc<dyn LinkListener>);

    /// Start delivering `event` to the bound listener.
    fn subscribe(&self, event: &str);

    /// Stop delivering `event`.
    fn unsubscribe(&self, event: &str);

    /// Send an event to this peer.
    fn emit(&self, event: &str, payload: Payload);

    /// Send an event to every other peer in the channel.
    fn broadcast(&self, event: &str, payload: Payload);

    /// Ask the transport to terminate the link.
    ///
    /// Completion is reported through [`LinkListener::on_disconnect`].
    fn disconnect(&self);
}

/// Channel-level notifications.
#[async_trait]
pub trait ChannelListener: Send + Sync + 'static {
    /// A peer completed its handshake.
    async fn on_connection(&self, link: Arc<dyn Link>);

    /// Data arrived for a peer the channel has not announced yet.
    async fn on_pre_handshake(&self, id: &str, packet: Packet);
}

/// Link-level notifications.
#[async_trait]
pub trait LinkListener: Send + Sync + 'static {
    /// Pre-dispatch hook, called once per inbound packet of a subscribed event.
    async fn on_packet(&self, packet: Packet);

    /// The link is gone.
    async fn on_disconnect(&self, reason: &str);
}
