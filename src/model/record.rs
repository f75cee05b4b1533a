use crate::ItemError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Structured data extracted from one fetched document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedRecord {
    /// Document title
    pub title: String,

    /// Short description or summary
    pub description: String,

    /// Keywords in document order
    pub keywords: Vec<String>,

    /// Publication time if the document declares one, otherwise processing time
    pub timestamp: DateTime<Utc>,

    /// The work item this record was produced from
    pub source: String,
}

impl ProcessedRecord {
    /// Creates a record with no source attached yet
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        keywords: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            keywords,
            timestamp,
            source: String::new(),
        }
    }

    /// Attaches the originating work item
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Returns true if no field carries extracted data
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.description.is_empty() && self.keywords.is_empty()
    }
}

/// Outcome for exactly one work item, as emitted by a worker
#[derive(Debug, Clone)]
pub struct TaggedResult {
    /// Position of the item in the submitted batch
    pub(crate) index: usize,

    /// The work item this result belongs to
    pub source: String,

    /// The record, or the first error encountered
    pub outcome: Result<ProcessedRecord, ItemError>,
}

impl TaggedResult {
    pub(crate) fn new(
        index: usize,
        source: String,
        outcome: Result<ProcessedRecord, ItemError>,
    ) -> Self {
        Self {
            index,
            source,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
