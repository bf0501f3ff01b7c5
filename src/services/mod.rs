pub(crate) mod availability;
pub(crate) mod grading;
pub(crate) mod statistics;

use thiserror::Error;

/// Caller-facing failures of the assessment engine. Every variant is
/// recoverable and carries enough context for the caller to react; storage
/// errors are not wrapped here and surface as internal errors instead.
#[derive(Debug, Error)]
pub(crate) enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Exhausted(String),
}
