//! Standard middleware.

pub mod logging;
#[cfg(feature = "timeout")]
pub mod timeout;

pub use logging::LoggingMiddleware;
#[cfg(feature = "timeout")]
pub use timeout::{TimeoutError, TimeoutMiddleware};
