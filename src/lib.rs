//! # idiomstore
//!
//! Data-access layer for a collection of programming idioms.
//!
//! An idiom is a title plus a set of per-language implementations. This crate
//! keeps three independently consistent stores loosely synchronized behind a
//! single read/write contract:
//!
//! - **Primary store**: authoritative `SQLite` storage of idiom records
//! - **Search index**: `SQLite` FTS5 full-text index, refreshed asynchronously
//! - **Cache**: expiring key/value cache (in-process LRU or Redis)
//!
//! Callers depend on the [`DataAccessor`] trait only. The concrete accessor is
//! a [`CachedAccessor`] wrapping a [`StoreAccessor`]:
//!
//! ```rust,ignore
//! use idiomstore::{AccessorFactory, DataAccessor, IdiomStoreConfig, RequestContext};
//!
//! let stack = AccessorFactory::from_config(&IdiomStoreConfig::load_default())?;
//! let ctx = RequestContext::new();
//! let recent = stack.accessor.recent_idioms(&ctx, &["rust".into()], true, 20)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod accessor;
pub mod cli;
pub mod config;
pub mod factory;
pub mod models;
pub mod observability;
pub mod storage;
pub mod tasks;

pub use accessor::{CachedAccessor, DataAccessor, StoreAccessor};
pub use config::{CacheTtls, IdiomStoreConfig};
pub use factory::{AccessorFactory, AccessorStack};
pub use models::{
    ApplicationConfig, HistoryItem, Idiom, IdiomField, IdiomId, IdiomOrder, ImplId,
    Implementation, SearchDocument, StorageKey, TextQuery, Toggles,
};
pub use observability::RequestContext;
pub use storage::{CacheBackend, HistoryLog, IdiomPersistence, IndexBackend};
pub use tasks::{BackgroundTaskRunner, Job, TaskRunner};

/// Error type for idiomstore operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotFound` | Missing idiom, implementation, or application config |
/// | `Conflict` | A generated id is already in use |
/// | `Inconsistent` | Stored data violates an invariant (detected at read time) |
/// | `Unsupported` | Multi-language list filters |
/// | `InvalidInput` | Malformed keys, orders, or empty required arguments |
/// | `Upstream` | Primary store, search index, cache, or task runner failures |
/// | `PartialResults` | Second phase of a two-phase search failed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An id collision was detected.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data violates an invariant.
    ///
    /// Raised when:
    /// - Several idioms claim the same implementation id
    /// - The idiom holding the maximum implementation id has no implementations
    #[error("inconsistent data: {0}")]
    Inconsistent(String),

    /// The operation is not supported for these arguments.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A backend operation failed.
    #[error("{backend} operation '{operation}' failed: {cause}")]
    Upstream {
        /// The backend that failed (`sqlite`, `fts5`, `redis`, ...).
        backend: &'static str,
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A multi-phase search produced only part of its results.
    ///
    /// `idioms` holds the best available partial result (favorite-language
    /// hits); `cause` is the error of the phase that failed.
    #[error("partial results ({} idioms): {cause}", idioms.len())]
    PartialResults {
        /// Results gathered before the failure.
        idioms: Vec<Idiom>,
        /// The failure of the later phase.
        #[source]
        cause: Box<Error>,
    },
}

impl Error {
    /// Builds an [`Error::Upstream`] from any displayable cause.
    pub fn upstream(
        backend: &'static str,
        operation: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Upstream {
            backend,
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for idiomstore operations.
pub type Result<T> = std::result::Result<T, Error>;
