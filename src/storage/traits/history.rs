//! History log trait.

use crate::Result;
use crate::models::{HistoryItem, IdiomId};

/// Append-only store of idiom snapshots.
pub trait HistoryLog: Send + Sync {
    /// Appends a snapshot.
    fn append(&self, item: &HistoryItem) -> Result<()>;

    /// Snapshots of one idiom, oldest first.
    fn list_for(&self, idiom_id: IdiomId) -> Result<Vec<HistoryItem>>;
}
