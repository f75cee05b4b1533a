use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for the aggregator
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub aggregator: PipelineConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

/// Worker pool, rate limit and lifecycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent executors
    #[serde(rename = "worker-count")]
    pub worker_count: u32,

    /// Maximum fetches admitted per second across all workers
    #[serde(rename = "requests-per-second")]
    pub requests_per_second: u32,

    /// How long shutdown waits for executors to exit (milliseconds)
    #[serde(rename = "shutdown-grace-ms", default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Optional deadline applied to every batch (milliseconds)
    #[serde(rename = "batch-timeout-ms", default)]
    pub batch_timeout_ms: Option<u64>,
}

impl PipelineConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the aggregator as announced to servers
    #[serde(rename = "client-name")]
    pub client_name: String,

    /// Version string
    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the aggregator
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.client_name, self.client_version, self.contact_url, self.contact_email
        )
    }
}

/// HTTP fetcher tuning
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Whole-request timeout (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connection establishment timeout (milliseconds)
    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bodies larger than this are rejected
    #[serde(rename = "max-body-bytes", default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Refuse plain HTTP targets
    #[serde(rename = "https-only", default)]
    pub https_only: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            https_only: false,
        }
    }
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024
}
