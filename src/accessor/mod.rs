//! The data-access contract and its two implementations.
//!
//! [`StoreAccessor`] talks to the primary store, search index, history log
//! and task runner directly. [`CachedAccessor`] wraps any accessor and answers
//! reads from the cache where it can. Both implement [`DataAccessor`], which
//! is sealed: callers compose the two, they do not add a third.

mod cache_entry;
mod cached;
pub mod ranking;
pub mod search;
mod store;

pub use cache_entry::CacheEntry;
pub use cached::CachedAccessor;
pub use store::StoreAccessor;

use crate::Result;
use crate::models::{
    ApplicationConfig, HistoryItem, Idiom, IdiomId, IdiomOrder, ImplId, StorageKey,
};
use crate::observability::RequestContext;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::StoreAccessor {}
    impl<A: super::DataAccessor> Sealed for super::CachedAccessor<A> {}
}

/// Read and write operations on idioms and application configuration.
///
/// Every operation takes the [`RequestContext`] of the calling request; its id
/// tags the tracing spans of the call and of the background jobs it
/// schedules.
///
/// Search and list results reflect the search index and cache, which may lag
/// behind the primary store.
pub trait DataAccessor: sealed::Sealed + Send + Sync {
    /// Fetches an idiom by id.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] if no idiom has this id.
    fn get_idiom(&self, ctx: &RequestContext, id: IdiomId) -> Result<(StorageKey, Idiom)>;

    /// Fetches the idiom owning an implementation.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] if no idiom owns it,
    /// [`crate::Error::Inconsistent`] if several do.
    fn get_idiom_by_impl_id(
        &self,
        ctx: &RequestContext,
        impl_id: ImplId,
    ) -> Result<(StorageKey, Idiom)>;

    /// Persists a new idiom.
    ///
    /// Sets creation and version dates to now, version to 1 and recomputes
    /// the implementation count. Indexing and the history snapshot happen
    /// later, in the background.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure, or [`crate::Error::InvalidInput`]
    /// for a non-positive id.
    fn save_new_idiom(&self, ctx: &RequestContext, idiom: &mut Idiom) -> Result<StorageKey>;

    /// Persists an updated idiom: version + 1, fresh version date, recomputed
    /// implementation count.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure.
    fn save_existing_idiom(
        &self,
        ctx: &RequestContext,
        key: &StorageKey,
        idiom: &mut Idiom,
    ) -> Result<()>;

    /// Deletes an idiom. History is kept.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] if no idiom has this id.
    fn delete_idiom(&self, ctx: &RequestContext, id: IdiomId) -> Result<()>;

    /// Removes one implementation from an idiom, as an idiom update.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] if the idiom or the implementation is absent.
    fn delete_impl(&self, ctx: &RequestContext, idiom_id: IdiomId, impl_id: ImplId)
    -> Result<()>;

    /// Deletes every idiom and its search document.
    ///
    /// # Errors
    ///
    /// Stops at the first index or store failure.
    fn delete_all_idioms(&self, ctx: &RequestContext) -> Result<()>;

    /// Lists idioms. `limit` 0 means no limit.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure.
    fn get_all_idioms(
        &self,
        ctx: &RequestContext,
        limit: usize,
        order: Option<IdiomOrder>,
    ) -> Result<(Vec<StorageKey>, Vec<Idiom>)>;

    /// Full-text search, optionally restricted to one language.
    ///
    /// # Errors
    ///
    /// Returns index or primary store failures.
    fn search_idioms_by_words(
        &self,
        ctx: &RequestContext,
        words: &[String],
        language: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Idiom>>;

    /// Full-text search with idioms implemented in a favorite language first.
    ///
    /// Every result contains all the words. With `see_non_favorite` the
    /// favorite hits are followed by hits with no favorite implementation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PartialResults`] with the favorite hits when
    /// only the second phase failed.
    fn search_idioms_by_words_with_favorites(
        &self,
        ctx: &RequestContext,
        words: &[String],
        favorites: &[String],
        see_non_favorite: bool,
        limit: usize,
    ) -> Result<Vec<Idiom>>;

    /// Idioms implemented in a language, best rated first.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidInput`] without a language,
    /// [`crate::Error::Unsupported`] with more than one.
    fn search_idioms_by_langs(
        &self,
        ctx: &RequestContext,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<Idiom>>;

    /// The `n` most recently written idioms, favorite languages considered.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure.
    fn recent_idioms(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        show_other: bool,
        n: usize,
    ) -> Result<Vec<Idiom>>;

    /// The `n` best rated idioms, favorite languages considered.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure.
    fn popular_idioms(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        show_other: bool,
        n: usize,
    ) -> Result<Vec<Idiom>>;

    /// One ordered query per favorite language, plus one unfiltered query
    /// when `show_other` is set, merged without duplicates. Implementations
    /// of each idiom come favorites first.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure.
    fn idioms_filter_order(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        limit_each_lang: usize,
        show_other: bool,
        order: IdiomOrder,
    ) -> Result<Vec<Idiom>>;

    /// One language per idiom: the language of its first implementation.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure.
    fn languages_having_impl(&self, ctx: &RequestContext) -> Result<Vec<String>>;

    /// A uniformly picked idiom.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] on an empty store.
    fn random_idiom(&self, ctx: &RequestContext) -> Result<(StorageKey, Idiom)>;

    /// Id for the next new idiom: 1 on an empty store, else max + 1.
    ///
    /// Not reserved: two concurrent callers may get the same id.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure.
    fn next_idiom_id(&self, ctx: &RequestContext) -> Result<IdiomId>;

    /// Id for the next new implementation.
    ///
    /// Not reserved: two concurrent callers may get the same id.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Conflict`] if the candidate is already used,
    /// [`crate::Error::Inconsistent`] if the idiom holding the maximum
    /// implementation id has no implementations.
    fn next_impl_id(&self, ctx: &RequestContext) -> Result<ImplId>;

    /// Loads the application configuration.
    ///
    /// # Errors
    ///
    /// [`crate::Error::NotFound`] if no toggle is stored.
    fn get_app_config(&self, ctx: &RequestContext) -> Result<ApplicationConfig>;

    /// Replaces the whole application configuration.
    ///
    /// # Errors
    ///
    /// Returns the primary store failure; nothing is written then.
    fn save_app_config(&self, ctx: &RequestContext, config: &ApplicationConfig) -> Result<()>;

    /// Snapshots of an idiom, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the history log failure.
    fn idiom_history(&self, ctx: &RequestContext, id: IdiomId) -> Result<Vec<HistoryItem>>;

    /// Rebuilds every search document from the primary store.
    ///
    /// Returns the number of indexed idioms.
    ///
    /// # Errors
    ///
    /// Stops at the first index or store failure.
    fn reindex_all(&self, ctx: &RequestContext) -> Result<usize>;

    /// Drops every cached entry. No-op without a cache.
    ///
    /// # Errors
    ///
    /// Returns the cache failure.
    fn delete_cache(&self, ctx: &RequestContext) -> Result<()>;
}
