//! Aggregator - batch orchestration logic
//!
//! This module contains the orchestrator that drives one batch through the
//! worker pool, including:
//! - Validating configuration before any instance exists
//! - Fanning work items out to the pool
//! - Fanning tagged results back in, racing cancellation and deadlines
//! - Assembling the batch outcome after every executor has exited
//! - Shutting down in-flight batches

use crate::config::{validate_pipeline, Config};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::model::{BatchOutcome, OutcomeCollector, TaggedResult, WorkItem};
use crate::pipeline::limiter::RateLimiter;
use crate::pipeline::pool::{WorkerContext, WorkerPool};
use crate::processor::{HtmlProcessor, Processor};
use crate::{AggregatorError, CancelCause, ConfigError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Default time `shutdown` waits for executors to exit
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Construction parameters for an [`Aggregator`]
///
/// Missing components and out-of-range numbers are rejected by
/// [`Aggregator::new`].
#[derive(Clone)]
pub struct AggregatorConfig {
    pub fetcher: Option<Arc<dyn Fetcher>>,
    pub processor: Option<Arc<dyn Processor>>,
    pub worker_count: u32,
    pub requests_per_second: u32,
    pub shutdown_grace: Duration,
    pub batch_timeout: Option<Duration>,
}

impl AggregatorConfig {
    pub fn new(worker_count: u32, requests_per_second: u32) -> Self {
        Self {
            fetcher: None,
            processor: None,
            worker_count,
            requests_per_second,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            batch_timeout: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }
}

/// Concurrent fetch-and-process orchestrator
///
/// One aggregator may run many batches, sequentially or concurrently. They
/// share the rate limiter and `worker_count` executor slots, so overlapping
/// batches never exceed `worker_count` items in flight between them.
pub struct Aggregator {
    context: Arc<WorkerContext>,
    worker_count: usize,
    requests_per_second: u32,
    shutdown_grace: Duration,
    batch_timeout: Option<Duration>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl Aggregator {
    /// Creates a new aggregator
    ///
    /// # Returns
    ///
    /// * `Ok(Aggregator)` - All parameters valid
    /// * `Err(ConfigError)` - A component is missing or a number is out of range
    pub fn new(config: AggregatorConfig) -> Result<Self, ConfigError> {
        let fetcher = config
            .fetcher
            .ok_or(ConfigError::MissingComponent("fetcher"))?;
        let processor = config
            .processor
            .ok_or(ConfigError::MissingComponent("processor"))?;

        validate_pipeline(config.worker_count, config.requests_per_second)?;

        if config.shutdown_grace.is_zero() {
            return Err(ConfigError::Validation(
                "shutdown_grace must be greater than zero".to_string(),
            ));
        }

        if config.batch_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Validation(
                "batch_timeout must be greater than zero when set".to_string(),
            ));
        }

        let context = Arc::new(WorkerContext {
            fetcher,
            processor,
            limiter: Arc::new(RateLimiter::new(config.requests_per_second)),
            slots: Semaphore::new(config.worker_count as usize),
        });

        tracing::debug!(
            "Aggregator created: {} workers, {} requests/sec",
            config.worker_count,
            config.requests_per_second
        );

        Ok(Self {
            context,
            worker_count: config.worker_count as usize,
            requests_per_second: config.requests_per_second,
            shutdown_grace: config.shutdown_grace,
            batch_timeout: config.batch_timeout,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Creates an aggregator from its four essential parameters
    pub fn with_components(
        fetcher: Arc<dyn Fetcher>,
        processor: Arc<dyn Processor>,
        worker_count: u32,
        requests_per_second: u32,
    ) -> Result<Self, ConfigError> {
        Self::new(
            AggregatorConfig::new(worker_count, requests_per_second)
                .fetcher(fetcher)
                .processor(processor),
        )
    }

    /// Creates an aggregator with the HTTP fetcher and HTML processor
    ///
    /// # Example
    ///
    /// ```no_run
    /// use content_aggregator::config::load_config;
    /// use content_aggregator::Aggregator;
    /// use std::path::Path;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = load_config(Path::new("aggregator.toml"))?;
    /// let aggregator = Aggregator::from_config(&config)?;
    /// let outcome = aggregator
    ///     .run(&CancellationToken::new(), ["https://example.com/"])
    ///     .await?;
    /// println!("{} records", outcome.records.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: &Config) -> Result<Self, AggregatorError> {
        let fetcher = HttpFetcher::new(&config.user_agent, &config.fetcher)?;

        let mut settings = AggregatorConfig::new(
            config.aggregator.worker_count,
            config.aggregator.requests_per_second,
        )
        .fetcher(Arc::new(fetcher))
        .processor(Arc::new(HtmlProcessor::new()))
        .shutdown_grace(config.aggregator.shutdown_grace());

        if let Some(timeout) = config.aggregator.batch_timeout() {
            settings = settings.batch_timeout(timeout);
        }

        Ok(Self::new(settings)?)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    /// Returns true once `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs one batch to completion or cancellation
    ///
    /// Uses the configured batch timeout, if any. Duplicate URLs are
    /// collapsed to their first occurrence.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOutcome)` - Records and per-item failures; `fatal` is set if
    ///   cancellation cut the batch short
    /// * `Err(AggregatorError::Closed)` - The aggregator was shut down
    pub async fn run<I>(&self, cancel: &CancellationToken, items: I) -> crate::Result<BatchOutcome>
    where
        I: IntoIterator,
        I::Item: Into<WorkItem>,
    {
        self.execute(cancel, items, self.batch_timeout).await
    }

    /// Runs one batch with an explicit deadline
    ///
    /// When the deadline elapses the batch is cancelled with
    /// `CancelCause::Deadline`.
    pub async fn run_with_timeout<I>(
        &self,
        cancel: &CancellationToken,
        items: I,
        timeout: Duration,
    ) -> crate::Result<BatchOutcome>
    where
        I: IntoIterator,
        I::Item: Into<WorkItem>,
    {
        self.execute(cancel, items, Some(timeout)).await
    }

    async fn execute<I>(
        &self,
        cancel: &CancellationToken,
        items: I,
        timeout: Option<Duration>,
    ) -> crate::Result<BatchOutcome>
    where
        I: IntoIterator,
        I::Item: Into<WorkItem>,
    {
        if self.is_closed() {
            return Err(AggregatorError::Closed);
        }

        let items = distinct_items(items);
        if items.is_empty() {
            tracing::debug!("Empty batch, nothing to do");
            return Ok(BatchOutcome::empty());
        }

        if cancel.is_cancelled() {
            tracing::warn!("Batch of {} items cancelled before it started", items.len());
            return Ok(OutcomeCollector::new(items).finish(Some(CancelCause::Caller)));
        }

        let start_time = std::time::Instant::now();
        let deadline = timeout.map(|t| Instant::now() + t);

        // Workers observe this token only. It is cancelled on shutdown, on
        // caller cancellation, when collection stops, or when this future is
        // dropped.
        let run_token = self.shutdown.child_token();
        let _abort_on_drop = run_token.clone().drop_guard();
        self.tracker.spawn(forward_cancellation(cancel.clone(), run_token.clone()));

        let (result_tx, mut result_rx) = mpsc::channel(items.len());
        let pool = WorkerPool::spawn(
            items.clone(),
            self.worker_count.min(items.len()),
            self.context.clone(),
            result_tx,
            run_token.clone(),
            &self.tracker,
        );

        tracing::info!(
            "Starting batch of {} items with {} workers",
            items.len(),
            pool.size()
        );

        let mut collector = OutcomeCollector::new(items);
        let interrupted = self
            .collect(&mut collector, &mut result_rx, cancel, deadline)
            .await;

        if let Some(cause) = interrupted {
            tracing::warn!(
                "Batch interrupted ({}) with {} items outstanding",
                cause,
                collector.remaining()
            );
        }

        // Completion barrier: no executor outlives this call.
        run_token.cancel();
        let abnormal = pool.join().await;
        if abnormal > 0 {
            tracing::error!("{} worker tasks ended abnormally", abnormal);
        }

        // Results sent before the executors stopped still count.
        while let Ok(result) = result_rx.try_recv() {
            collector.accept(result);
        }

        let outcome = collector.finish(interrupted);

        tracing::info!(
            "Batch finished in {:?}: {} succeeded, {} failed{}",
            start_time.elapsed(),
            outcome.succeeded(),
            outcome.failed(),
            if outcome.is_complete() { "" } else { " (incomplete)" }
        );

        Ok(outcome)
    }

    /// Fan-in loop
    ///
    /// Returns the cancellation cause if collection stopped before every
    /// item reported.
    async fn collect(
        &self,
        collector: &mut OutcomeCollector,
        results: &mut mpsc::Receiver<TaggedResult>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Option<CancelCause> {
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(expired);

        while !collector.is_done() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Some(CancelCause::Caller),
                _ = self.shutdown.cancelled() => return Some(CancelCause::Shutdown),
                _ = &mut expired => return Some(CancelCause::Deadline),
                received = results.recv() => match received {
                    Some(result) => {
                        collector.accept(result);
                    }
                    None => {
                        tracing::error!(
                            "All workers exited with {} items unreported",
                            collector.remaining()
                        );
                        return None;
                    }
                },
            }
        }

        None
    }

    /// Stops the aggregator
    ///
    /// Cancels any in-flight batch, waits up to the shutdown grace period for
    /// every executor to exit, and rejects later `run` calls. Calling it again
    /// is a no-op.
    pub async fn shutdown(&self) -> crate::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Aggregator already shut down");
            return Ok(());
        }

        tracing::info!("Shutting down aggregator");
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(self.shutdown_grace, self.tracker.wait()).await {
            Ok(()) => {
                tracing::debug!("All workers exited");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    "{} worker tasks still running after {:?}",
                    self.tracker.len(),
                    self.shutdown_grace
                );
                Err(AggregatorError::ShutdownTimeout {
                    grace: self.shutdown_grace,
                })
            }
        }
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Cancels `run` when the caller cancels; exits once `run` is cancelled
async fn forward_cancellation(caller: CancellationToken, run: CancellationToken) {
    tokio::select! {
        _ = caller.cancelled() => run.cancel(),
        _ = run.cancelled() => {}
    }
}

/// Collapses duplicates, keeping the first occurrence of each item
fn distinct_items<I>(items: I) -> Vec<WorkItem>
where
    I: IntoIterator,
    I::Item: Into<WorkItem>,
{
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    let mut duplicates = 0usize;

    for item in items {
        let item: WorkItem = item.into();
        if seen.insert(item.clone()) {
            distinct.push(item);
        } else {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        tracing::debug!("Dropped {} duplicate items from batch", duplicates);
    }

    distinct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use crate::model::ProcessedRecord;
    use crate::processor::ProcessError;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, _cancel: &CancellationToken, _url: &str) -> Result<Vec<u8>, FetchError> {
            Ok(b"content".to_vec())
        }
    }

    struct StaticProcessor;

    #[async_trait]
    impl Processor for StaticProcessor {
        async fn process(
            &self,
            _cancel: &CancellationToken,
            _content: &[u8],
        ) -> Result<ProcessedRecord, ProcessError> {
            Ok(ProcessedRecord::new("T", "", vec![], Utc::now()))
        }
    }

    fn config(workers: u32, rps: u32) -> AggregatorConfig {
        AggregatorConfig::new(workers, rps)
            .fetcher(Arc::new(StaticFetcher))
            .processor(Arc::new(StaticProcessor))
    }

    #[test]
    fn test_missing_components_rejected() {
        let no_fetcher = AggregatorConfig::new(1, 1).processor(Arc::new(StaticProcessor));
        assert!(matches!(
            Aggregator::new(no_fetcher),
            Err(ConfigError::MissingComponent("fetcher"))
        ));

        let no_processor = AggregatorConfig::new(1, 1).fetcher(Arc::new(StaticFetcher));
        assert!(matches!(
            Aggregator::new(no_processor),
            Err(ConfigError::MissingComponent("processor"))
        ));
    }

    #[test]
    fn test_numeric_bounds_rejected() {
        assert!(matches!(
            Aggregator::new(config(0, 1)),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Aggregator::new(config(1, 0)),
            Err(ConfigError::Validation(_))
        ));
        assert!(Aggregator::new(config(1, 1).shutdown_grace(Duration::ZERO)).is_err());
        assert!(Aggregator::new(config(1, 1).batch_timeout(Duration::ZERO)).is_err());
    }

    #[test]
    fn test_accessors() {
        let aggregator = Aggregator::new(config(3, 7)).unwrap();
        assert_eq!(aggregator.worker_count(), 3);
        assert_eq!(aggregator.requests_per_second(), 7);
        assert!(!aggregator.is_closed());
    }

    #[test]
    fn test_distinct_items_keeps_first_occurrence() {
        let items = distinct_items(["b", "a", "b", "c", "a"]);
        assert_eq!(items, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_duplicates_yield_one_record() {
        let aggregator = Aggregator::new(config(2, 1000)).unwrap();
        let outcome = aggregator
            .run(&CancellationToken::new(), ["https://a/", "https://a/"])
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_then_run_is_closed() {
        let aggregator = Aggregator::new(config(1, 1)).unwrap();
        aggregator.shutdown().await.unwrap();
        assert!(aggregator.is_closed());

        let result = aggregator
            .run(&CancellationToken::new(), ["https://a/"])
            .await;
        assert!(matches!(result, Err(AggregatorError::Closed)));
    }
}
