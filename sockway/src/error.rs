//! Error types for sockway.

use thiserror::Error;

/// Errors raised synchronously by registration and lifecycle calls.
///
/// Failures inside handler chains never surface here; they are caught and
/// reported at the connection boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A call was made with missing or inconsistent arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `start` was called on something already started.
    #[error("{0} is already started")]
    AlreadyStarted(String),
}

/// Result alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
