//! Execution of background jobs against the stores.

use super::Job;
use crate::Result;
use crate::models::{HistoryItem, SearchDocument};
use crate::storage::{HistoryLog, IdiomPersistence, IndexBackend};
use std::sync::Arc;
use tracing::instrument;

/// Something that can run a [`Job`].
pub trait JobHandler: Send + Sync {
    /// Runs the job once.
    ///
    /// # Errors
    ///
    /// Returns the failure of this attempt; the caller decides on retries.
    fn handle(&self, job: &Job) -> Result<()>;
}

/// Runs jobs against the primary store, search index and history log.
pub struct JobExecutor {
    persistence: Arc<dyn IdiomPersistence>,
    index: Arc<dyn IndexBackend>,
    history: Arc<dyn HistoryLog>,
}

impl JobExecutor {
    /// Creates an executor over the given stores.
    #[must_use]
    pub fn new(
        persistence: Arc<dyn IdiomPersistence>,
        index: Arc<dyn IndexBackend>,
        history: Arc<dyn HistoryLog>,
    ) -> Self {
        Self {
            persistence,
            index,
            history,
        }
    }
}

impl JobHandler for JobExecutor {
    #[instrument(skip(self), fields(job = job.name(), key = %job.key()))]
    fn handle(&self, job: &Job) -> Result<()> {
        let key = job.key();
        let current = self.persistence.get(key)?;
        match (job, current) {
            (Job::IndexIdiom(_), Some(idiom)) => {
                self.index.put(&SearchDocument::from_idiom(key, &idiom))
            },
            (Job::IndexIdiom(_), None) => {
                tracing::debug!("Idiom gone, removing its search document");
                self.index.remove(&key.encode()).map(|_| ())
            },
            (Job::SaveHistoryItem(_), Some(idiom)) => {
                self.history.append(&HistoryItem::capture(&idiom))
            },
            (Job::SaveHistoryItem(_), None) => {
                tracing::debug!("Idiom gone, no history snapshot");
                Ok(())
            },
        }
    }
}
