use crate::config::types::{Config, FetcherConfig, PipelineConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

const MAX_WORKERS: u32 = 256;
const MAX_REQUESTS_PER_SECOND: u32 = 10_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline(
        config.aggregator.worker_count,
        config.aggregator.requests_per_second,
    )?;
    validate_lifecycle(&config.aggregator)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_fetcher_config(&config.fetcher)?;
    Ok(())
}

/// Validates worker count and admission rate
///
/// Shared by the file loader and by direct aggregator construction, so an
/// aggregator can never exist with settings the loader would reject.
pub fn validate_pipeline(worker_count: u32, requests_per_second: u32) -> Result<(), ConfigError> {
    if worker_count < 1 || worker_count > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "worker_count must be between 1 and {}, got {}",
            MAX_WORKERS, worker_count
        )));
    }

    if requests_per_second < 1 || requests_per_second > MAX_REQUESTS_PER_SECOND {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be between 1 and {}, got {}",
            MAX_REQUESTS_PER_SECOND, requests_per_second
        )));
    }

    Ok(())
}

fn validate_lifecycle(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.shutdown_grace_ms < 1 {
        return Err(ConfigError::Validation(
            "shutdown_grace_ms must be >= 1".to_string(),
        ));
    }

    if config.batch_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "batch_timeout_ms must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the identity announced in the `User-Agent` header
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    require("client_name", &config.client_name)?;
    if let Some(bad) = config
        .client_name
        .chars()
        .find(|c| !c.is_alphanumeric() && *c != '-')
    {
        return Err(ConfigError::Validation(format!(
            "client_name may only use letters, digits and '-', found {:?} in '{}'",
            bad, config.client_name
        )));
    }

    require("client_version", &config.client_version)?;

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("contact_url '{}': {}", config.contact_url, e)))?;

    validate_email(&config.contact_email)
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.connect_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_ms must be >= 100ms, got {}ms",
            config.connect_timeout_ms
        )));
    }

    if config.max_body_bytes < 1 {
        return Err(ConfigError::Validation(
            "max_body_bytes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Checks for a single `@` followed by a dotted domain
fn validate_email(email: &str) -> Result<(), ConfigError> {
    require("contact_email", email)?;

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() > 1
                && domain.split('.').all(|label| !label.is_empty())
        }
        None => false,
    };

    if !valid {
        return Err(ConfigError::Validation(format!(
            "contact_email '{}' is not an address",
            email
        )));
    }

    Ok(())
}
