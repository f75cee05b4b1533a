//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. Applications embedding the
//! aggregator call [`init_logging`] once to print them.

use tracing_subscriber::EnvFilter;

/// Builds the filter for a verbosity level
///
/// `RUST_LOG`, when set and valid, overrides the verbosity flags.
pub fn build_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if quiet {
        // Only show errors
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::new("content_aggregator=info,warn"),
        1 => EnvFilter::new("content_aggregator=debug,info"),
        2 => EnvFilter::new("content_aggregator=trace,debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Installs a formatting subscriber for the given verbosity
///
/// Returns false if a global subscriber was already installed.
pub fn init_logging(verbose: u8, quiet: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .try_init()
        .is_ok()
}
