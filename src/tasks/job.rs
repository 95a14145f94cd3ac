//! Background job definitions.

use crate::models::StorageKey;
use std::fmt;

/// Out-of-band work scheduled after a successful primary store write.
///
/// Both jobs re-read the current primary record, so running one twice or
/// late is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Rebuild and republish the search document of an idiom.
    IndexIdiom(StorageKey),
    /// Append a history snapshot of an idiom.
    SaveHistoryItem(StorageKey),
}

impl Job {
    /// Stable job name, used for routing, logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::IndexIdiom(_) => "index-text-idiom",
            Self::SaveHistoryItem(_) => "save-history-item",
        }
    }

    /// The identity argument of the job.
    #[must_use]
    pub const fn key(&self) -> &StorageKey {
        match self {
            Self::IndexIdiom(key) | Self::SaveHistoryItem(key) => key,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.key())
    }
}
