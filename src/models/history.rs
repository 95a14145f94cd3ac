//! Idiom history snapshots.

use super::Idiom;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of an idiom, appended after every create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// The idiom as it was stored.
    pub idiom: Idiom,
    /// When the snapshot was taken.
    pub recorded_at: DateTime<Utc>,
}

impl HistoryItem {
    /// Snapshots `idiom` now.
    #[must_use]
    pub fn capture(idiom: &Idiom) -> Self {
        Self {
            idiom: idiom.clone(),
            recorded_at: Utc::now(),
        }
    }
}
