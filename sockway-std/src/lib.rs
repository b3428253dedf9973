//! # sockway-std
//!
//! Standard implementations for the sockway namespace and middleware engine.
//!
//! This crate provides:
//! - **Registries**: [`ListenerRegistry`], [`MiddlewareRegistry`]
//! - **Standard middleware**: Logging, Timeout
//! - **Transports**: [`MemoryTransport`], an in-process transport
//! - **Testing**: counting, halting, failing and order-recording handlers

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use sockway_core;

// Modules
pub mod middleware;
pub mod registry;
pub mod testing;
pub mod transport;

pub use registry::{ListenerRegistry, MiddlewareRegistry};
pub use transport::MemoryTransport;
