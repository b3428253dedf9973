#![allow(dead_code)]

use sockway::{
    BoxError, Context, Handler, MemoryChannel, MemoryTransport, Next, Payload, Server,
    ServerConfig, async_trait,
};
use std::sync::{Arc, Mutex};

// ============================================================================
// Setup
// ============================================================================

/// A started server on an in-process transport.
pub fn started_server(config: ServerConfig) -> (Server, MemoryTransport) {
    let server = Server::new(config);
    let transport = MemoryTransport::new();
    server.start(Some(Arc::new(transport.clone()))).unwrap();
    (server, transport)
}

/// The channel for `path`, which must already be started.
pub fn channel(transport: &MemoryTransport, path: &str) -> Arc<MemoryChannel> {
    transport.channel(path).expect("namespace not started")
}

/// Shared log of observations.
pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.lock().unwrap().clone()
}

// ============================================================================
// Handlers
// ============================================================================

/// Records `(tag, data)` and continues.
pub struct Recorder {
    pub tag: &'static str,
    pub log: Log<(&'static str, Payload)>,
}

#[async_trait]
impl Handler<Context> for Recorder {
    async fn handle(&self, ctx: &mut Context, next: Next<'_, Context>) -> Result<(), BoxError> {
        self.log.lock().unwrap().push((self.tag, ctx.data.clone()));
        next.run(ctx).await
    }
}

/// Records `(tag, data)` and stops the chain.
pub struct Terminal {
    pub tag: &'static str,
    pub log: Log<(&'static str, Payload)>,
}

#[async_trait]
impl Handler<Context> for Terminal {
    async fn handle(&self, ctx: &mut Context, _next: Next<'_, Context>) -> Result<(), BoxError> {
        self.log.lock().unwrap().push((self.tag, ctx.data.clone()));
        Ok(())
    }
}

/// Records the address of the context it receives, then continues.
pub struct AddressRecorder {
    pub log: Log<usize>,
}

#[async_trait]
impl Handler<Context> for AddressRecorder {
    async fn handle(&self, ctx: &mut Context, next: Next<'_, Context>) -> Result<(), BoxError> {
        let address = &*ctx as *const Context as usize;
        self.log.lock().unwrap().push(address);
        next.run(ctx).await
    }
}

/// Writes `key = value` into the context state, then continues.
pub struct StateWriter {
    pub key: &'static str,
    pub value: Payload,
}

#[async_trait]
impl Handler<Context> for StateWriter {
    async fn handle(&self, ctx: &mut Context, next: Next<'_, Context>) -> Result<(), BoxError> {
        ctx.state.insert(self.key.to_string(), self.value.clone());
        next.run(ctx).await
    }
}

/// Records the state value under `key` (or null), then continues.
pub struct StateReader {
    pub key: &'static str,
    pub log: Log<Payload>,
}

#[async_trait]
impl Handler<Context> for StateReader {
    async fn handle(&self, ctx: &mut Context, next: Next<'_, Context>) -> Result<(), BoxError> {
        let value = ctx.state.get(self.key).cloned().unwrap_or(Payload::Null);
        self.log.lock().unwrap().push(value);
        next.run(ctx).await
    }
}

/// Stops the chain when the event data equals `blocked`.
pub struct Gate {
    pub blocked: Payload,
}

#[async_trait]
impl Handler<Context> for Gate {
    async fn handle(&self, ctx: &mut Context, next: Next<'_, Context>) -> Result<(), BoxError> {
        if ctx.data == self.blocked {
            return Ok(());
        }
        next.run(ctx).await
    }
}

/// Panics on every invocation.
pub struct Panicking;

#[async_trait]
impl Handler<Context> for Panicking {
    async fn handle(&self, _ctx: &mut Context, _next: Next<'_, Context>) -> Result<(), BoxError> {
        panic!("listener bug");
    }
}
