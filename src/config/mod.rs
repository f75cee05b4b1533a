//! Configuration module for the aggregator
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use content_aggregator::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("aggregator.toml")).unwrap();
//! println!("Workers: {}", config.aggregator.worker_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetcherConfig, PipelineConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{load_config, load_config_str};

pub use validation::{validate, validate_pipeline};
