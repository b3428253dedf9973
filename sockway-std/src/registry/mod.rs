//! Mutable handler registries.
//!
//! Both registries keep their composed [`Chain`](sockway_core::Chain) as a
//! derived cache that is rebuilt on every write. Reads hand out clones of the
//! current chain, so a chain that is already running is never affected by a
//! later registration.

pub mod listeners;
pub mod middleware;

pub use listeners::ListenerRegistry;
pub use middleware::MiddlewareRegistry;
