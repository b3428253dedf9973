//! Transport implementations.

pub mod memory;

pub use memory::{LinkOp, MemoryChannel, MemoryLink, MemoryTransport};
