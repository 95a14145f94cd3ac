//! Search index trait.
//!
//! The index is a derived view of the primary store. Documents are keyed by
//! the encoded storage key and searches return only those identities; callers
//! resolve them with a batched primary fetch.
//!
//! | Error | Recovery |
//! |-------|----------|
//! | `Error::Upstream` | Retry, or rebuild with `reindex_all` |
//! | `Error::InvalidInput` | Query could not be rendered |

use crate::Result;
use crate::models::{SearchDocument, TextQuery};

/// Full-text index of search documents.
pub trait IndexBackend: Send + Sync {
    /// Inserts or replaces a document.
    fn put(&self, document: &SearchDocument) -> Result<()>;

    /// Removes a document. Returns whether it existed.
    fn remove(&self, doc_id: &str) -> Result<bool>;

    /// Identities of documents matching `query`, at most `limit` of them.
    ///
    /// A `limit` of zero returns nothing.
    fn search(&self, query: &TextQuery, limit: usize) -> Result<Vec<String>>;

    /// Removes every document.
    fn clear(&self) -> Result<()>;

    /// Number of indexed documents.
    fn count(&self) -> Result<usize>;
}
