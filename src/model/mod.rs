//! Data carried through the pipeline
//!
//! This module contains:
//! - The structured record produced for each successful work item
//! - The tagged result each worker emits
//! - The aggregated outcome returned to the caller

mod outcome;
mod record;

pub use outcome::BatchOutcome;
pub(crate) use outcome::OutcomeCollector;
pub use record::{ProcessedRecord, TaggedResult};

/// One URL submitted for aggregation
pub type WorkItem = String;
