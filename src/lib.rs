//! Content-Aggregator: a concurrent fetch-and-extract pipeline
//!
//! This crate takes a batch of URLs, fetches each one through a pluggable
//! [`Fetcher`], turns the raw bytes into a [`ProcessedRecord`] through a
//! pluggable [`Processor`], and hands back a [`BatchOutcome`] with the
//! successes and the per-URL failures. Concurrency is bounded by a fixed
//! worker pool, outbound fetches are admitted by a shared rate limiter, and
//! every blocking step observes a cancellation token.

pub mod config;
pub mod fetcher;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod processor;

use std::time::Duration;
use thiserror::Error;

/// Main error type for aggregator operations
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Aggregator is closed")]
    Closed,

    #[error("Workers did not exit within the shutdown grace period of {grace:?}")]
    ShutdownTimeout { grace: Duration },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing pipeline component: {0}")]
    MissingComponent(&'static str),
}

/// What fired the cancellation signal of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelCause {
    /// The caller's cancellation token fired
    Caller,

    /// The aggregator was shut down while the batch was running
    Shutdown,

    /// The batch deadline elapsed
    Deadline,
}

impl std::fmt::Display for CancelCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CancelCause::Caller => "cancelled by caller",
            CancelCause::Shutdown => "aggregator shut down",
            CancelCause::Deadline => "batch deadline elapsed",
        };
        write!(f, "{}", s)
    }
}

/// Failure recorded against a single work item
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum ItemError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Processing failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Cancelled: {0}")]
    Cancelled(CancelCause),

    #[error("Worker exited before reporting this item")]
    Abandoned,
}

impl ItemError {
    /// Returns true if this item never completed because the batch was cancelled
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ItemError::Cancelled(_))
    }
}

/// Result type alias for aggregator operations
pub type Result<T> = std::result::Result<T, AggregatorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use model::{BatchOutcome, ProcessedRecord, TaggedResult, WorkItem};
pub use pipeline::{Aggregator, AggregatorConfig, RateLimiter};
pub use processor::{HtmlProcessor, ProcessError, Processor};
