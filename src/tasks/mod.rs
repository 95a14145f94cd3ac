//! Asynchronous task execution.
//!
//! Writes to the primary store schedule follow-up work (search indexing,
//! history snapshots) as [`Job`]s. The writer only submits; execution,
//! retries and failure accounting belong to the runner.

mod executor;
mod job;
mod retry;
mod runner;

pub use executor::{JobExecutor, JobHandler};
pub use job::Job;
pub use retry::RetryPolicy;
pub use runner::{BackgroundTaskRunner, DeadLetter};

use std::sync::Arc;

/// Accepts jobs for out-of-band execution.
pub trait TaskRunner: Send + Sync {
    /// Schedules a job. Never blocks on its execution and never reports its
    /// outcome.
    fn submit(&self, job: Job);
}

/// Runs each job on the submitting thread, once.
///
/// Failures are logged and dropped, as with the background runner.
pub struct InlineTaskRunner {
    handler: Arc<dyn JobHandler>,
}

impl InlineTaskRunner {
    /// Creates a runner calling `handler` directly.
    #[must_use]
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        Self { handler }
    }
}

impl TaskRunner for InlineTaskRunner {
    fn submit(&self, job: Job) {
        if let Err(e) = self.handler.handle(&job) {
            tracing::error!(job = job.name(), key = %job.key(), error = %e, "Inline job failed");
            metrics::counter!("task_jobs_total", "job" => job.name(), "status" => "dead_letter")
                .increment(1);
        } else {
            metrics::counter!("task_jobs_total", "job" => job.name(), "status" => "success")
                .increment(1);
        }
    }
}
