//! error.rs - Error taxonomy for the price pipeline, detector and input loop
//!
//! None of these ever escape a tick or a refresh cycle as a hard failure:
//! callers log them and fall back to stale or empty results.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the acquisition, detection and input paths
#[derive(Error, Debug, Clone)]
pub enum PricerError {
    /// Transport failure while talking to the price API
    #[error("transport error on page {page}: {message}")]
    TransientFetch { page: u32, message: String },

    /// A page request exceeded its timeout
    #[error("page {page} timed out after {timeout:?}")]
    Timeout { page: u32, timeout: Duration },

    /// Response or snapshot file could not be deserialized
    #[error("malformed response ({context}): {message}")]
    MalformedResponse { context: String, message: String },

    /// A UI node could not be read
    #[error("traversal error: {0}")]
    Traversal(String),

    /// A required setting is missing or invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Local snapshot file could not be read
    #[error("cannot read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// Synthetic input could not be injected
    #[error("input error: {0}")]
    Input(String),
}

impl PricerError {
    pub fn malformed(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PricerError::MalformedResponse {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// True for errors that halt a paged fetch but leave the cache untouched
    pub fn is_transient(&self) -> bool {
        matches!(self, PricerError::TransientFetch { .. } | PricerError::Timeout { .. })
    }
}

pub type PricerResult<T> = Result<T, PricerError>;
