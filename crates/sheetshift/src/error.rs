//! Error types for the sheetshift facade
//!
//! Per-formula failures never appear here: they become
//! [`TranslationStatus::Unsupported`](crate::TranslationStatus) results. These errors are
//! the ones a caller has to act on.

use sheetshift_formula::RuleLoadError;
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    RuleLoad(#[from] RuleLoadError),

    /// Cache export or import data that is not a valid record list
    #[error("cache data is malformed: {0}")]
    CacheCodec(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to start the translation worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
