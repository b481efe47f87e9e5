use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ArchiveJob, ArchiveOutcome, ArchivePipeline};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("archive queue is closed")]
    Closed,
}

/// Producer side of the archive queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ArchiveQueue {
    tx: mpsc::Sender<ArchiveJob>,
}

impl ArchiveQueue {
    /// Create a queue holding at most `capacity` waiting jobs.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ArchiveJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Wait for a free slot in the queue.
    ///
    /// Holding the slot guarantees the job can be handed over without
    /// blocking or failing. Dropping it unused releases the slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool has stopped.
    pub async fn reserve(&self) -> Result<ArchiveSlot<'_>, QueueError> {
        self.tx
            .reserve()
            .await
            .map(ArchiveSlot)
            .map_err(|_| QueueError::Closed)
    }
}

/// A reserved place in the archive queue.
pub struct ArchiveSlot<'a>(mpsc::Permit<'a, ArchiveJob>);

impl ArchiveSlot<'_> {
    pub fn send(self, job: ArchiveJob) {
        debug!(hash = %job.hash, "Archive job queued");
        self.0.send(job);
    }
}

/// Runs queued archive jobs with bounded concurrency.
///
/// Each job gets a time limit. Cancelling the token stops taking new jobs and
/// aborts running ones, which kills any downloader process they started.
pub struct ArchivePool {
    pipeline: Arc<ArchivePipeline>,
    semaphore: Arc<Semaphore>,
    job_timeout: Duration,
    cancel: CancellationToken,
}

impl ArchivePool {
    #[must_use]
    pub fn new(
        pipeline: Arc<ArchivePipeline>,
        concurrency: usize,
        job_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            job_timeout,
            cancel,
        }
    }

    /// Run the pool on its own task.
    #[must_use]
    pub fn spawn(self, rx: mpsc::Receiver<ArchiveJob>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Pull jobs until the queue closes or the token is cancelled, then wait
    /// for running jobs to finish.
    pub async fn run(self, mut rx: mpsc::Receiver<ArchiveJob>) {
        let mut tasks = JoinSet::new();

        loop {
            let job = tokio::select! {
                () = self.cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let permit = tokio::select! {
                () = self.cancel.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let pipeline = Arc::clone(&self.pipeline);
            let cancel = self.cancel.clone();
            let job_timeout = self.job_timeout;
            debug!(hash = %job.hash, "Dispatching archive job");
            tasks.spawn(async move {
                let _permit = permit;
                run_job(&pipeline, job, job_timeout, &cancel).await;
            });

            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!("Archive task panicked: {e}");
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Archive task panicked: {e}");
            }
        }
        info!("Archive pool stopped");
    }
}

async fn run_job(
    pipeline: &ArchivePipeline,
    job: ArchiveJob,
    job_timeout: Duration,
    cancel: &CancellationToken,
) {
    let hash = job.hash.clone();

    tokio::select! {
        () = cancel.cancelled() => {
            warn!(hash = %hash, "Archive job cancelled");
        }
        result = tokio::time::timeout(job_timeout, pipeline.run(&job)) => match result {
            Err(_) => warn!(hash = %hash, timeout_secs = job_timeout.as_secs(), "Archive job timed out"),
            Ok(Err(e)) => error!(hash = %hash, "Archive job failed: {e:#}"),
            Ok(Ok(ArchiveOutcome::ToolUnavailable)) => {
                debug!(hash = %hash, "Archive job skipped, downloader unavailable");
            }
            Ok(Ok(ArchiveOutcome::Downloaded { dir })) => {
                info!(hash = %hash, dir = %dir.display(), "Archive job finished (download only)");
            }
            Ok(Ok(ArchiveOutcome::Uploaded { dir, report, cleanup })) => {
                info!(
                    hash = %hash,
                    dir = %dir.display(),
                    uploaded = report.uploaded.len(),
                    failed = report.failed,
                    cleaned = cleanup.is_some(),
                    "Archive job finished"
                );
            }
        },
    }
}
