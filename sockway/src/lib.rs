//! # sockway - Event routing for multiplexed real-time connections
//!
//! `sockway` groups peers of a real-time transport into **namespaces** and
//! runs every inbound event through a Koa-style chain:
//!
//! ```text
//! namespace middleware -> connection middleware -> listeners -> postware
//! ```
//!
//! Each stage receives the connection's single [`Context`] and a [`Next`]
//! continuation. Calling `next.run(ctx).await` continues the chain; returning
//! without calling it stops the chain.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sockway::prelude::*;
//!
//! let server = Server::default();
//!
//! server.middleware(handler(|ctx, next| Box::pin(async move {
//!     ctx.state.insert("seen".into(), true.into());
//!     next.run(ctx).await
//! })), None);
//!
//! server.on("ping", handler(|ctx, _next| Box::pin(async move {
//!     ctx.acknowledge("pong");
//!     Ok(())
//! })), None);
//!
//! server.start(None)?;
//! ```
//!
//! ## Pre-handshake packets
//!
//! Packets a peer sends before its handshake completes are screened by
//! namespace middleware on a placeholder connection. When the handshake
//! completes, the packets that passed are delivered to the real connection
//! without running namespace middleware again.
//!
//! ## Crates
//!
//! - `sockway-core`: handler composition, errors, transport traits
//! - `sockway-std`: registries, stock middleware, in-process transport

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod config;
mod connection;
mod context;
mod error;
mod namespace;
mod server;

pub use config::{
    DEFAULT_MAX_GHOSTS, DEFAULT_MAX_PENDING_PACKETS, DEFAULT_NAMESPACE, ServerConfig, ServerConfigBuilder,
    normalize_path,
};
pub use connection::{CONNECTION_EVENT, Connection, DISCONNECT_EVENT, EarlyPacket, is_reserved};
pub use context::Context;
pub use error::{Error, Result};
pub use namespace::Namespace;
pub use server::Server;

pub use sockway_core::{
    Ack, BoxError, BoxFuture, BoxHandler, Chain, ChainError, Channel, ChannelListener,
    Disposition, Handler, HandlerError, HandlerFn, HandlerId, Link, LinkListener, Next, Packet,
    Payload, Transport, async_trait, classify, handler_fn,
};
pub use sockway_std::{
    ListenerRegistry, MemoryTransport, MiddlewareRegistry,
    middleware::{LoggingMiddleware, TimeoutError, TimeoutMiddleware},
    testing,
    transport::{LinkOp, MemoryChannel, MemoryLink},
};

/// Wrap a closure as a [`Handler`] over [`Context`].
///
/// ```rust,ignore
/// namespace.on("message", handler(|ctx, next| Box::pin(async move {
///     ctx.emit("echo", ctx.data.clone());
///     next.run(ctx).await
/// })));
/// ```
pub fn handler<F>(f: F) -> HandlerFn<F, Context>
where
    F: for<'a> Fn(&'a mut Context, Next<'a, Context>) -> BoxFuture<'a, Result<(), BoxError>>
        + Send
        + Sync
        + 'static,
{
    handler_fn(f)
}

/// Common imports.
pub mod prelude {
    pub use crate::{
        Connection, Context, Error, Handler, HandlerError, HandlerId, Namespace, Next, Packet,
        Payload, Server, ServerConfig, async_trait, handler,
    };
    pub use sockway_core::BoxError;
}
