//! Content fetching
//!
//! This module contains:
//! - The `Fetcher` capability the pipeline depends on
//! - The per-item fetch error taxonomy
//! - `HttpFetcher`, a reqwest-backed implementation

mod http;

pub use http::{build_http_client, HttpFetcher};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Retrieves raw content for a URL
///
/// Implementations must return promptly once `cancel` fires, and must never
/// return a payload together with an error.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Transport-level failure for one URL
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum FetchError {
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Rate limited by server for {url}")]
    RateLimited { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("Body of {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Builds a transport error from any displayable failure
    pub fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
