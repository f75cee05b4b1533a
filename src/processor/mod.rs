//! Content processing
//!
//! This module contains:
//! - The `Processor` capability the pipeline depends on
//! - The per-item processing error taxonomy
//! - `HtmlProcessor`, a scraper-backed metadata extractor

mod html;

pub use html::HtmlProcessor;

use crate::model::ProcessedRecord;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Turns raw content into a structured record
///
/// Extraction must be deterministic for identical input. When nothing can be
/// extracted the processor reports `ProcessError::NoData` rather than an
/// empty record.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        cancel: &CancellationToken,
        content: &[u8],
    ) -> Result<ProcessedRecord, ProcessError>;
}

/// Extraction failure for one document
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "kebab-case")]
pub enum ProcessError {
    #[error("No extractable data found")]
    NoData,

    #[error("Content is not valid text: {0}")]
    InvalidEncoding(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Processor failed: {0}")]
    Internal(String),
}
