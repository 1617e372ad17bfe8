//! Error taxonomy for the pipeline
//!
//! Four failure classes drive the recovery policy:
//! - `Provider` with `transient = true` is retried, then degraded to a fallback
//! - `Validation` is rejected immediately, never retried
//! - `NotConfigured` routes to the deterministic fallback for that concern
//! - `Conflict` signals a state/ownership violation on a lead decision

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum Error {
    /// An upstream provider failed. `transient` marks timeout/5xx-class
    /// failures that are eligible for retry.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        transient: bool,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("audio error: {0}")]
    Audio(String),
}

impl Error {
    /// A transient provider failure (timeout, 5xx, connection reset).
    pub fn transient(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            transient: true,
        }
    }

    /// A permanent provider failure (4xx, malformed response).
    pub fn permanent(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            transient: false,
        }
    }

    /// Whether this failure is eligible for retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { transient: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_flag() {
        assert!(Error::transient("stt", "timeout").is_transient());
        assert!(!Error::permanent("stt", "bad request").is_transient());
        assert!(!Error::Validation("empty address".into()).is_transient());
        assert!(!Error::NotConfigured("llm").is_transient());
    }
}
