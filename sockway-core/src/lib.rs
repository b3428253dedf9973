//! # sockway-core
//!
//! Core traits for the sockway namespace and middleware engine.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! transports and middleware crates that don't need the full `sockway`
//! server.
//!
//! # Layers
//!
//! ## Composition ([`Handler`], [`Next`], [`Chain`])
//!
//! Every middleware, postware and listener is a [`Handler`] receiving a shared
//! mutable context and a [`Next`] continuation. A [`Chain`] composes an
//! ordered handler list into one callable with koa-style semantics: calling
//! `next` advances, not calling it short-circuits, an error aborts.
//!
//! ## Transport boundary ([`Transport`], [`Channel`], [`Link`])
//!
//! What a real-time transport exposes: named channels, per-peer links,
//! subscription by event name, emit and broadcast, disconnect. Notifications
//! come back through [`ChannelListener`] and [`LinkListener`].
//!
//! # Error Types
//!
//! - [`BoxError`] - What handlers return
//! - [`HandlerError`] - Status/expose carrying application error
//! - [`ChainError`] - Failures caught at the dispatch boundary

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod chain;
mod error;
mod handler;
mod message;
mod transport;

// Re-exports
pub use async_trait::async_trait;
pub use chain::{Chain, Next};
pub use error::{BoxError, ChainError, Disposition, HandlerError, classify};
pub use futures::future::BoxFuture;
pub use handler::{BoxHandler, Handler, HandlerFn, HandlerId, handler_fn};
pub use message::{Ack, Packet, Payload};
pub use transport::{Channel, ChannelListener, Link, LinkListener, Transport};
