//! Error types for sockway.
//!
//! - [`BoxError`] - The failure type every handler returns
//! - [`HandlerError`] - An application failure carrying a status and an expose marker
//! - [`ChainError`] - Failures observed at the dispatch boundary
//! - [`Disposition`] - How the dispatch boundary reports a failure

use std::any::Any;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An application failure raised from a handler.
///
/// Mirrors the status/expose pair of HTTP-style frameworks: a `404` or an
/// error built with [`HandlerError::hidden`] is expected noise and is only
/// recorded for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (status {status})")]
pub struct HandlerError {
    /// HTTP-like status code.
    pub status: u16,
    /// Whether the failure should be surfaced to operators.
    pub expose: bool,
    /// Human readable message.
    pub message: String,
}

impl HandlerError {
    /// Create an exposed error with the given status.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            expose: true,
            message: message.into(),
        }
    }

    /// A not-found failure.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    /// Mark this error as not exposed.
    pub fn hidden(mut self) -> Self {
        self.expose = false;
        self
    }
}

/// A failure caught while running a composed chain.
#[derive(Error, Debug)]
pub enum ChainError {
    /// A stage returned an error.
    #[error("handler chain failed: {0}")]
    Failed(#[source] BoxError),

    /// A stage panicked. The payload is not an error value.
    #[error("handler chain panicked: {0}")]
    Panicked(String),
}

impl ChainError {
    /// Build a [`ChainError::Panicked`] from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        ChainError::Panicked(message)
    }

    /// Decide how this failure is reported.
    pub fn disposition(&self) -> Disposition {
        match self {
            ChainError::Failed(err) => classify(err),
            ChainError::Panicked(_) => Disposition::ProgrammingError,
        }
    }
}

/// Reporting decision for a failure reaching the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Expected failure; record at debug level only.
    DiagnosticOnly,
    /// Unexpected failure; report it, keep the connection alive.
    Reported,
    /// Something that is not an error reached the boundary.
    ProgrammingError,
}

/// Classify a handler failure.
///
/// Errors that are (or wrap, through `source()`) a [`HandlerError`] with
/// `expose == false` or status `404` are diagnostic-only.
pub fn classify(err: &BoxError) -> Disposition {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err.as_ref());
    while let Some(e) = current {
        if let Some(handler) = e.downcast_ref::<HandlerError>() {
            if !handler.expose || handler.status == 404 {
                return Disposition::DiagnosticOnly;
            }
            return Disposition::Reported;
        }
        current = e.source();
    }
    Disposition::Reported
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_diagnostic_only() {
        let err: BoxError = Box::new(HandlerError::not_found("no such room"));
        assert_eq!(classify(&err), Disposition::DiagnosticOnly);
    }

    #[test]
    fn test_hidden_is_diagnostic_only() {
        let err: BoxError = Box::new(HandlerError::new(500, "boom").hidden());
        assert_eq!(classify(&err), Disposition::DiagnosticOnly);
    }

    #[test]
    fn test_plain_errors_are_reported() {
        let err: BoxError = "plain failure".into();
        assert_eq!(classify(&err), Disposition::Reported);

        let err: BoxError = Box::new(HandlerError::new(500, "boom"));
        assert_eq!(classify(&err), Disposition::Reported);
    }

    #[test]
    fn test_wrapped_handler_error_is_found() {
        let inner: BoxError = Box::new(HandlerError::not_found("gone"));
        let err: BoxError = Box::new(ChainError::Failed(inner));
        assert_eq!(classify(&err), Disposition::DiagnosticOnly);
    }

    #[test]
    fn test_panic_payloads() {
        let err = ChainError::from_panic(Box::new("kaboom"));
        assert!(matches!(&err, ChainError::Panicked(m) if m == "kaboom"));
        assert_eq!(err.disposition(), Disposition::ProgrammingError);

        let err = ChainError::from_panic(Box::new(42_u8));
        assert!(matches!(&err, ChainError::Panicked(m) if m == "non-string panic payload"));
    }
}
