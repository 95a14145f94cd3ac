//! Background task runner.
//!
//! One worker thread drains a channel of jobs. Failed attempts are retried
//! with exponential backoff; jobs that exhaust their attempts are kept in a
//! dead-letter list together with their last error. The writer that
//! submitted a job never sees its outcome.

use super::{Job, JobHandler, RetryPolicy, TaskRunner};
use crate::observability::{current_request_id, enter_request_context, RequestContext};
use crate::storage::sqlite::acquire_lock;
use crate::{Error, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// A job that failed on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// The job.
    pub job: Job,
    /// Number of attempts made.
    pub attempts: u32,
    /// Error of the last attempt.
    pub error: String,
}

struct Envelope {
    job: Job,
    request_id: Option<String>,
}

#[derive(Default)]
struct RunnerState {
    pending: Mutex<usize>,
    idle: Condvar,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl RunnerState {
    fn finish_one(&self) {
        let mut pending = acquire_lock(&self.pending);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Runs jobs on a dedicated worker thread.
///
/// Dropping the runner stops accepting jobs, drains the queue and joins the
/// worker.
pub struct BackgroundTaskRunner {
    sender: Mutex<Option<Sender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Arc<RunnerState>,
}

impl BackgroundTaskRunner {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(handler: Arc<dyn JobHandler>, policy: RetryPolicy) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let state = Arc::new(RunnerState::default());
        let worker_state = Arc::clone(&state);
        let worker = std::thread::Builder::new()
            .name("idiomstore-tasks".to_string())
            .spawn(move || worker_loop(&receiver, handler.as_ref(), policy, &worker_state))
            .map_err(|e| Error::upstream("tasks", "spawn_worker", e))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            state,
        })
    }

    /// Blocks until no job is queued or running, or `timeout` elapses.
    ///
    /// Returns true if the runner became idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let pending = acquire_lock(&self.state.pending);
        let (pending, _) = self
            .state
            .idle
            .wait_timeout_while(pending, timeout, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *pending == 0
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        *acquire_lock(&self.state.pending)
    }

    /// Jobs that failed on every attempt, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        acquire_lock(&self.state.dead_letters).clone()
    }

    /// Stops accepting jobs, finishes queued ones and joins the worker.
    pub fn shutdown(&self) {
        drop(acquire_lock(&self.sender).take());
        if let Some(worker) = acquire_lock(&self.worker).take() {
            if worker.join().is_err() {
                tracing::error!("Task worker panicked");
            }
        }
    }
}

impl TaskRunner for BackgroundTaskRunner {
    fn submit(&self, job: Job) {
        let envelope = Envelope {
            job,
            request_id: current_request_id(),
        };
        *acquire_lock(&self.state.pending) += 1;

        let sent = acquire_lock(&self.sender)
            .as_ref()
            .is_some_and(|sender| sender.send(envelope).is_ok());
        if !sent {
            self.state.finish_one();
            tracing::error!(job = job.name(), key = %job.key(), "Task runner is shut down, job dropped");
            metrics::counter!("task_jobs_total", "job" => job.name(), "status" => "dropped")
                .increment(1);
        }
    }
}

impl Drop for BackgroundTaskRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    receiver: &Receiver<Envelope>,
    handler: &dyn JobHandler,
    policy: RetryPolicy,
    state: &RunnerState,
) {
    for envelope in receiver {
        let _guard = envelope
            .request_id
            .map(|id| enter_request_context(RequestContext::from_id(id)));
        run_with_retries(envelope.job, handler, policy, state);
        state.finish_one();
    }
}

fn run_with_retries(job: Job, handler: &dyn JobHandler, policy: RetryPolicy, state: &RunnerState) {
    let span = tracing::info_span!(
        "task",
        job = job.name(),
        key = %job.key(),
        request_id = current_request_id().as_deref().unwrap_or("-")
    );
    let _entered = span.enter();

    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match handler.handle(&job) {
            Ok(()) => {
                tracing::debug!(attempt, "Job done");
                metrics::counter!("task_jobs_total", "job" => job.name(), "status" => "success")
                    .increment(1);
                return;
            },
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis(), "Job failed, retrying");
                metrics::counter!("task_jobs_total", "job" => job.name(), "status" => "retry")
                    .increment(1);
                std::thread::sleep(delay);
            },
            Err(e) => {
                tracing::error!(attempt, error = %e, "Job failed, dead-lettering");
                metrics::counter!("task_jobs_total", "job" => job.name(), "status" => "dead_letter")
                    .increment(1);
                metrics::counter!("task_dead_letters_total").increment(1);
                acquire_lock(&state.dead_letters).push(DeadLetter {
                    job,
                    attempts: attempt,
                    error: e.to_string(),
                });
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdiomId, StorageKey};
    use std::sync::atomic::{AtomicU32, Ordering};

    const WAIT: Duration = Duration::from_secs(5);

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyHandler {
        failures: u32,
        calls: AtomicU32,
        request_ids: Mutex<Vec<Option<String>>>,
    }

    impl FlakyHandler {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                request_ids: Mutex::new(Vec::new()),
            })
        }
    }

    impl JobHandler for FlakyHandler {
        fn handle(&self, _job: &Job) -> Result<()> {
            self.request_ids.lock().unwrap().push(current_request_id());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(Error::upstream("fts5", "put", "database is locked"))
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    fn job(id: i64) -> Job {
        Job::IndexIdiom(StorageKey::for_idiom(IdiomId::new(id)))
    }

    #[test]
    fn test_runs_submitted_jobs() {
        let handler = FlakyHandler::new(0);
        let runner = BackgroundTaskRunner::start(handler.clone(), fast_policy(3)).unwrap();
        runner.submit(job(1));
        runner.submit(job(2));

        assert!(runner.wait_idle(WAIT));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(runner.pending(), 0);
        assert!(runner.dead_letters().is_empty());
    }

    #[test]
    fn test_retries_then_succeeds() {
        let handler = FlakyHandler::new(2);
        let runner = BackgroundTaskRunner::start(handler.clone(), fast_policy(3)).unwrap();
        runner.submit(job(1));

        assert!(runner.wait_idle(WAIT));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(runner.dead_letters().is_empty());
    }

    #[test]
    fn test_dead_letters_after_max_attempts() {
        let handler = FlakyHandler::new(u32::MAX);
        let runner = BackgroundTaskRunner::start(handler.clone(), fast_policy(2)).unwrap();
        runner.submit(job(9));

        assert!(runner.wait_idle(WAIT));
        let dead = runner.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job, job(9));
        assert_eq!(dead[0].attempts, 2);
        assert!(dead[0].error.contains("database is locked"));
    }

    #[test]
    fn test_propagates_request_id() {
        let handler = FlakyHandler::new(0);
        let runner = BackgroundTaskRunner::start(handler.clone(), fast_policy(1)).unwrap();
        {
            let _guard = enter_request_context(RequestContext::from_id("req-42"));
            runner.submit(job(1));
        }
        runner.submit(job(2));

        assert!(runner.wait_idle(WAIT));
        let ids = handler.request_ids.lock().unwrap().clone();
        assert_eq!(ids, vec![Some("req-42".to_string()), None]);
    }

    #[test]
    fn test_submit_after_shutdown_drops_job() {
        let handler = FlakyHandler::new(0);
        let runner = BackgroundTaskRunner::start(handler.clone(), fast_policy(1)).unwrap();
        runner.shutdown();
        runner.submit(job(1));

        assert!(runner.wait_idle(WAIT));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }
}
