//! The aggregation pipeline
//!
//! This module contains the concurrent core, including:
//! - Process-wide rate limiting of outbound fetches
//! - The fixed-size worker pool
//! - Batch orchestration, fan-in and shutdown

mod aggregator;
mod limiter;
mod pool;

pub use aggregator::{Aggregator, AggregatorConfig, DEFAULT_SHUTDOWN_GRACE};
pub use limiter::{Cancelled, RateLimiter};
