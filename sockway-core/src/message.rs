//! Inbound units of data.

use std::{fmt, sync::Arc};

/// Event payloads are JSON values.
pub type Payload = serde_json::Value;

/// The acknowledgement callback a peer attached to an event.
#[derive(Clone)]
pub struct Ack(Arc<dyn Fn(Payload) + Send + Sync>);

impl Ack {
    /// Wrap a callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Reply to the peer.
    pub fn send(&self, payload: Payload) {
        (self.0)(payload)
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ack")
    }
}

/// One raw inbound unit: an event name, its payload and an optional ack.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Payload,
    /// Acknowledgement callback, if the peer asked for one.
    pub ack: Option<Ack>,
}

impl Packet {
    /// Create a packet without an acknowledgement.
    pub fn new(event: impl Into<String>, data: impl Into<Payload>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            ack: None,
        }
    }

    /// Attach an acknowledgement callback.
    pub fn with_ack(mut self, ack: Ack) -> Self {
        self.ack = Some(ack);
        self
    }
}
