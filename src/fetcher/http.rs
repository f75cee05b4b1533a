//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the pipeline, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests raced against the cancellation token
//! - Body size limiting
//! - Error classification

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::fetcher::{FetchError, Fetcher};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `config` - Timeouts and transport policy
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use content_aggregator::config::{FetcherConfig, UserAgentConfig};
/// use content_aggregator::fetcher::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     client_name: "ContentAggregator".to_string(),
///     client_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    config: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_millis(config.timeout_ms))
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .https_only(config.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches documents over HTTP(S)
///
/// # Response Handling
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx | Body bytes (possibly empty) |
/// | HTTP 404 | `NotFound` |
/// | HTTP 429 | `RateLimited` |
/// | Other non-2xx | `Status` |
/// | Timeout | `Timeout` |
/// | Connection refused / TLS | `Connect` |
/// | Body over limit | `TooLarge` |
/// | Token cancelled | `Cancelled` |
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: u64,
    https_only: bool,
}

impl HttpFetcher {
    /// Creates a fetcher with a freshly built client
    pub fn new(user_agent: &UserAgentConfig, config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, config)?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, config: &FetcherConfig) -> Self {
        Self {
            client,
            max_body_bytes: config.max_body_bytes,
            https_only: config.https_only,
        }
    }

    fn check_url(&self, url: &str) -> Result<Url, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        match parsed.scheme() {
            "https" => Ok(parsed),
            "http" if !self.https_only => Ok(parsed),
            scheme => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                message: format!("unsupported scheme '{}'", scheme),
            }),
        }
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let target = self.check_url(url)?;

        let mut response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })? {
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::trace!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<u8>, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.get(url) => result,
        }
    }
}

/// Maps a reqwest failure onto the fetch taxonomy
fn classify_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() {
        FetchError::Connect {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        FetchError::transport(url, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_user_agent() -> UserAgentConfig {
        UserAgentConfig {
            client_name: "TestAggregator".to_string(),
            client_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_user_agent(), &FetcherConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            create_user_agent().header_value(),
            "TestAggregator/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_check_url_rejects_bad_input() {
        let fetcher = HttpFetcher::new(&create_user_agent(), &FetcherConfig::default()).unwrap();

        assert!(fetcher.check_url("https://example.com/").is_ok());
        assert!(fetcher.check_url("http://example.com/").is_ok());
        assert!(matches!(
            fetcher.check_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            fetcher.check_url("ftp://example.com/file"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_https_only_rejects_plain_http() {
        let config = FetcherConfig {
            https_only: true,
            ..FetcherConfig::default()
        };
        let fetcher = HttpFetcher::new(&create_user_agent(), &config).unwrap();
        assert!(matches!(
            fetcher.check_url("http://example.com/"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_returns_cancelled_when_token_already_fired() {
        let fetcher = HttpFetcher::new(&create_user_agent(), &FetcherConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fetcher.fetch(&cancel, "https://example.invalid/").await;
        assert_eq!(result, Err(FetchError::Cancelled));
    }
}
