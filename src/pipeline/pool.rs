//! Fixed-size pool of fetch/process executors
//!
//! This module handles:
//! - Feeding work items into a bounded job queue
//! - Running `size` executors over that queue
//! - Holding one of the aggregator's executor slots while an item is in flight
//! - Rate limiting, fetching and processing each item
//! - Emitting exactly one tagged result per completed item
//! - Joining every executor before the batch is reported

use crate::fetcher::Fetcher;
use crate::model::{ProcessedRecord, TaggedResult, WorkItem};
use crate::pipeline::limiter::RateLimiter;
use crate::processor::Processor;
use crate::ItemError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// The collaborators every executor shares
pub(crate) struct WorkerContext {
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) processor: Arc<dyn Processor>,
    pub(crate) limiter: Arc<RateLimiter>,
    /// One permit per configured worker, shared by every batch
    pub(crate) slots: Semaphore,
}

/// A work item together with its submission position
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub(crate) index: usize,
    pub(crate) url: WorkItem,
}

type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Running executors for one batch
pub(crate) struct WorkerPool {
    tasks: JoinSet<()>,
    size: usize,
}

impl WorkerPool {
    /// Starts the feeder and `size` executors
    ///
    /// # Arguments
    ///
    /// * `items` - The batch; each item is queued exactly once
    /// * `size` - Number of executors, at least one
    /// * `context` - Fetcher, processor and rate limiter
    /// * `results` - Sink every executor reports into
    /// * `cancel` - Stops the feeder and every executor
    /// * `tracker` - Registers the tasks so shutdown can wait for them
    pub(crate) fn spawn(
        items: Vec<WorkItem>,
        size: usize,
        context: Arc<WorkerContext>,
        results: mpsc::Sender<TaggedResult>,
        cancel: CancellationToken,
        tracker: &TaskTracker,
    ) -> Self {
        let size = size.max(1);
        let (job_tx, job_rx) = mpsc::channel(size);
        let jobs: JobQueue = Arc::new(Mutex::new(job_rx));

        let mut tasks = JoinSet::new();

        let jobs_to_feed: Vec<Job> = items
            .into_iter()
            .enumerate()
            .map(|(index, url)| Job { index, url })
            .collect();
        tasks.spawn(tracker.track_future(feed(jobs_to_feed, job_tx, cancel.clone())));

        for worker_id in 0..size {
            tasks.spawn(tracker.track_future(run_worker(
                worker_id,
                context.clone(),
                jobs.clone(),
                results.clone(),
                cancel.clone(),
            )));
        }

        tracing::debug!("Started {} workers", size);

        Self { tasks, size }
    }

    /// Number of executors in this pool
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Waits for the feeder and every executor to exit
    ///
    /// Returns the number of tasks that ended abnormally.
    pub(crate) async fn join(mut self) -> usize {
        let mut failed = 0;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                failed += 1;
                tracing::error!("Worker task ended abnormally: {}", e);
            }
        }
        failed
    }
}

/// Pushes jobs into the bounded queue until done or cancelled
async fn feed(jobs: Vec<Job>, queue: mpsc::Sender<Job>, cancel: CancellationToken) {
    let total = jobs.len();
    for (sent, job) in jobs.into_iter().enumerate() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Feeder cancelled after queueing {} of {} items", sent, total);
                return;
            }
            result = queue.send(job) => {
                if result.is_err() {
                    tracing::debug!("Job queue closed after {} of {} items", sent, total);
                    return;
                }
            }
        }
    }
    tracing::trace!("Feeder queued all {} items", total);
}

/// Executor loop: take a job, handle it, report, repeat
async fn run_worker(
    worker_id: usize,
    context: Arc<WorkerContext>,
    jobs: JobQueue,
    results: mpsc::Sender<TaggedResult>,
    cancel: CancellationToken,
) {
    tracing::trace!("Worker {} started", worker_id);
    let mut handled = 0usize;

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = next_job(&jobs) => match job {
                Some(job) => job,
                None => break,
            },
        };

        let outcome = match handle_job(&context, &cancel, &job).await {
            Some(outcome) => outcome,
            None => {
                tracing::debug!("Worker {} cancelled while handling {}", worker_id, job.url);
                break;
            }
        };

        if let Err(e) = &outcome {
            tracing::warn!("Item {} failed: {}", job.url, e);
        }

        if results
            .send(TaggedResult::new(job.index, job.url, outcome))
            .await
            .is_err()
        {
            tracing::debug!("Worker {} lost its result sink", worker_id);
            break;
        }
        handled += 1;
    }

    tracing::debug!("Worker {} exiting after {} items", worker_id, handled);
}

async fn next_job(jobs: &JobQueue) -> Option<Job> {
    jobs.lock().await.recv().await
}

/// Rate limits, fetches and processes one job
///
/// Returns `None` when cancellation interrupted the job; such an item is
/// reported by the collector, not by the executor.
async fn handle_job(
    context: &WorkerContext,
    cancel: &CancellationToken,
    job: &Job,
) -> Option<Result<ProcessedRecord, ItemError>> {
    // Held until the item is fetched and processed.
    let _slot = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        permit = context.slots.acquire() => permit.ok()?,
    };

    context.limiter.acquire(cancel).await.ok()?;

    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        fetched = context.fetcher.fetch(cancel, &job.url) => fetched,
    };

    let content = match fetched {
        Ok(content) => content,
        Err(_) if cancel.is_cancelled() => return None,
        Err(e) => return Some(Err(ItemError::Fetch(e))),
    };

    let processed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        processed = context.processor.process(cancel, &content) => processed,
    };

    match processed {
        Ok(record) => Some(Ok(record.with_source(job.url.clone()))),
        Err(_) if cancel.is_cancelled() => None,
        Err(e) => Some(Err(ItemError::Process(e))),
    }
}
