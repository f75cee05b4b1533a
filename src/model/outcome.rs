use crate::model::{ProcessedRecord, TaggedResult, WorkItem};
use crate::{CancelCause, ItemError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregated result of one batch run
///
/// `records` is sorted by submission order, never by completion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Successfully processed records, in submission order
    pub records: Vec<ProcessedRecord>,

    /// Per-item failures keyed by work item
    pub failures: BTreeMap<WorkItem, ItemError>,

    /// Set when cancellation interrupted the batch before every item completed
    pub fatal: Option<ItemError>,
}

impl BatchOutcome {
    /// Returns an outcome with no records, failures or fatal error
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if every item produced its own result
    pub fn is_complete(&self) -> bool {
        self.fatal.is_none()
    }

    /// Number of successful items
    pub fn succeeded(&self) -> usize {
        self.records.len()
    }

    /// Number of failed items, cancellations included
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Looks up the failure recorded for a work item
    pub fn failure(&self, item: &str) -> Option<&ItemError> {
        self.failures.get(item)
    }

    /// Looks up the record produced for a work item
    pub fn record(&self, item: &str) -> Option<&ProcessedRecord> {
        self.records.iter().find(|r| r.source == item)
    }
}

/// Fan-in state for one batch
///
/// Owned by the collection loop alone. Workers never see it; they only send
/// `TaggedResult`s through the result channel.
pub(crate) struct OutcomeCollector {
    items: Vec<WorkItem>,
    slots: Vec<Option<Result<ProcessedRecord, ItemError>>>,
    remaining: usize,
}

impl OutcomeCollector {
    pub(crate) fn new(items: Vec<WorkItem>) -> Self {
        let slots = vec![None; items.len()];
        let remaining = items.len();
        Self {
            items,
            slots,
            remaining,
        }
    }

    /// Stores a result against the item it is tagged with
    ///
    /// Returns false if the tag does not match a pending item.
    pub(crate) fn accept(&mut self, result: TaggedResult) -> bool {
        let slot = match self.slots.get_mut(result.index) {
            Some(slot) => slot,
            None => {
                tracing::warn!("Discarding result with unknown index {}", result.index);
                return false;
            }
        };

        if self.items[result.index] != result.source {
            tracing::warn!(
                "Discarding result for {} tagged with the index of {}",
                result.source,
                self.items[result.index]
            );
            return false;
        }

        if slot.is_some() {
            tracing::warn!("Discarding duplicate result for {}", result.source);
            return false;
        }

        *slot = Some(result.outcome);
        self.remaining -= 1;
        true
    }

    pub(crate) fn is_done(&self) -> bool {
        self.remaining == 0
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    /// Assembles the caller-facing outcome
    ///
    /// Items without a result are marked with the cancellation cause when the
    /// batch was interrupted, and as abandoned otherwise.
    pub(crate) fn finish(self, interrupted: Option<CancelCause>) -> BatchOutcome {
        let mut outcome = BatchOutcome::empty();

        for (item, slot) in self.items.into_iter().zip(self.slots) {
            match slot {
                Some(Ok(record)) => outcome.records.push(record),
                Some(Err(err)) => {
                    outcome.failures.insert(item, err);
                }
                None => {
                    let err = match interrupted {
                        Some(cause) => ItemError::Cancelled(cause),
                        None => ItemError::Abandoned,
                    };
                    outcome.failures.insert(item, err);
                }
            }
        }

        if self.remaining > 0 {
            if let Some(cause) = interrupted {
                outcome.fatal = Some(ItemError::Cancelled(cause));
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FetchError, ProcessError};
    use chrono::Utc;

    fn record(source: &str) -> ProcessedRecord {
        ProcessedRecord::new("T", "", vec![], Utc::now()).with_source(source)
    }

    fn items(names: &[&str]) -> Vec<WorkItem> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collects_out_of_order_results_in_submission_order() {
        let mut collector = OutcomeCollector::new(items(&["a", "b", "c"]));

        assert!(collector.accept(TaggedResult::new(2, "c".into(), Ok(record("c")))));
        assert!(collector.accept(TaggedResult::new(0, "a".into(), Ok(record("a")))));
        assert!(!collector.is_done());
        assert!(collector.accept(TaggedResult::new(1, "b".into(), Ok(record("b")))));
        assert!(collector.is_done());

        let outcome = collector.finish(None);
        let sources: Vec<_> = outcome.records.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "b", "c"]);
        assert!(outcome.failures.is_empty());
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_partitions_failures() {
        let mut collector = OutcomeCollector::new(items(&["a", "b"]));
        collector.accept(TaggedResult::new(0, "a".into(), Ok(record("a"))));
        collector.accept(TaggedResult::new(
            1,
            "b".into(),
            Err(ItemError::Process(ProcessError::NoData)),
        ));

        let outcome = collector.finish(None);
        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(
            outcome.failure("b"),
            Some(&ItemError::Process(ProcessError::NoData))
        );
        assert!(outcome.record("a").is_some());
    }

    #[test]
    fn test_rejects_duplicate_and_mistagged_results() {
        let mut collector = OutcomeCollector::new(items(&["a", "b"]));
        assert!(collector.accept(TaggedResult::new(0, "a".into(), Ok(record("a")))));
        assert!(!collector.accept(TaggedResult::new(0, "a".into(), Ok(record("a")))));
        assert!(!collector.accept(TaggedResult::new(1, "a".into(), Ok(record("a")))));
        assert!(!collector.accept(TaggedResult::new(7, "z".into(), Ok(record("z")))));
        assert_eq!(collector.remaining(), 1);
    }

    #[test]
    fn test_interrupted_batch_marks_missing_items_cancelled() {
        let mut collector = OutcomeCollector::new(items(&["a", "b", "c"]));
        collector.accept(TaggedResult::new(0, "a".into(), Ok(record("a"))));
        collector.accept(TaggedResult::new(
            1,
            "b".into(),
            Err(ItemError::Fetch(FetchError::NotFound { url: "b".into() })),
        ));

        let outcome = collector.finish(Some(CancelCause::Caller));
        assert_eq!(outcome.fatal, Some(ItemError::Cancelled(CancelCause::Caller)));
        assert_eq!(
            outcome.failure("c"),
            Some(&ItemError::Cancelled(CancelCause::Caller))
        );
        assert!(matches!(outcome.failure("b"), Some(ItemError::Fetch(_))));
        assert_eq!(outcome.succeeded(), 1);
    }

    #[test]
    fn test_cancellation_after_completion_is_not_fatal() {
        let mut collector = OutcomeCollector::new(items(&["a"]));
        collector.accept(TaggedResult::new(0, "a".into(), Ok(record("a"))));

        let outcome = collector.finish(Some(CancelCause::Caller));
        assert!(outcome.fatal.is_none());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_missing_items_without_cancellation_are_abandoned() {
        let collector = OutcomeCollector::new(items(&["a"]));
        let outcome = collector.finish(None);
        assert_eq!(outcome.failure("a"), Some(&ItemError::Abandoned));
        assert!(outcome.fatal.is_none());
    }
}
