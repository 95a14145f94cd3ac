//! Read-through cache decorator.

use super::{CacheEntry, DataAccessor};
use crate::config::CacheTtls;
use crate::models::{
    ApplicationConfig, HistoryItem, Idiom, IdiomId, IdiomOrder, ImplId, StorageKey,
    normalize_language, normalize_word,
};
use crate::observability::RequestContext;
use crate::storage::CacheBackend;
use crate::storage::sqlite::acquire_lock;
use crate::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Values that can be stored in the cache.
trait Cacheable: Sized {
    fn to_entry(&self) -> CacheEntry;
    fn from_entry(entry: CacheEntry) -> Option<Self>;
}

impl Cacheable for Idiom {
    fn to_entry(&self) -> CacheEntry {
        CacheEntry::Idiom(self.clone())
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        match entry {
            CacheEntry::Idiom(idiom) => Some(idiom),
            _ => None,
        }
    }
}

impl Cacheable for (StorageKey, Idiom) {
    fn to_entry(&self) -> CacheEntry {
        CacheEntry::KeyedIdiom {
            key: self.0,
            idiom: self.1.clone(),
        }
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        match entry {
            CacheEntry::KeyedIdiom { key, idiom } => Some((key, idiom)),
            _ => None,
        }
    }
}

impl Cacheable for (Vec<StorageKey>, Vec<Idiom>) {
    fn to_entry(&self) -> CacheEntry {
        CacheEntry::KeyedIdiomList {
            keys: self.0.clone(),
            idioms: self.1.clone(),
        }
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        match entry {
            CacheEntry::KeyedIdiomList { keys, idioms } if keys.len() == idioms.len() => {
                Some((keys, idioms))
            },
            _ => None,
        }
    }
}

impl Cacheable for Vec<Idiom> {
    fn to_entry(&self) -> CacheEntry {
        CacheEntry::IdiomList(self.clone())
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        match entry {
            CacheEntry::IdiomList(idioms) => Some(idioms),
            _ => None,
        }
    }
}

impl Cacheable for Vec<String> {
    fn to_entry(&self) -> CacheEntry {
        CacheEntry::StringList(self.clone())
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        match entry {
            CacheEntry::StringList(strings) => Some(strings),
            _ => None,
        }
    }
}

impl Cacheable for ApplicationConfig {
    fn to_entry(&self) -> CacheEntry {
        CacheEntry::Config(self.clone())
    }

    fn from_entry(entry: CacheEntry) -> Option<Self> {
        match entry {
            CacheEntry::Config(config) => Some(config),
            _ => None,
        }
    }
}

/// Listing keys remembered for eviction unless configured otherwise.
const DEFAULT_TRACKED_LISTINGS: usize = 10_000;

enum Lookup<T> {
    Hit(T),
    Miss,
    Broken,
}

fn listing_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

fn idiom_key(id: IdiomId) -> String {
    format!("getIdiom({id})")
}

fn impl_key(impl_id: ImplId) -> String {
    format!("getIdiomByImplID({impl_id})")
}

/// `[a b c]`, each item normalized.
fn list_arg(items: &[String], normalize: fn(&str) -> String) -> String {
    let normalized: Vec<String> = items.iter().map(|item| normalize(item)).collect();
    format!("[{}]", normalized.join(" "))
}

/// Accessor answering reads from a cache before asking the wrapped accessor.
///
/// Cache failures never fail a request: a broken read falls through to the
/// inner accessor, a failed write is logged.
///
/// Entries are keyed by operation name and normalized arguments, e.g.
/// `getIdiom(42)` or `searchIdiomsByLangs([go],10)`.
pub struct CachedAccessor<A> {
    inner: A,
    cache: Arc<dyn CacheBackend>,
    ttls: CacheTtls,
    /// Keys of list entries populated by this instance, evicted on delete.
    /// Keys dropped from this LRU are left to expire.
    listings: Mutex<LruCache<String, ()>>,
}

impl<A: DataAccessor> CachedAccessor<A> {
    /// Wraps `inner` with `cache`.
    pub fn new(inner: A, cache: Arc<dyn CacheBackend>, ttls: CacheTtls) -> Self {
        Self {
            inner,
            cache,
            ttls,
            listings: Mutex::new(LruCache::new(listing_capacity(DEFAULT_TRACKED_LISTINGS))),
        }
    }

    /// Bounds the number of listing keys remembered for eviction.
    pub fn limit_tracked_listings(&self, capacity: usize) {
        acquire_lock(&self.listings).resize(listing_capacity(capacity));
    }

    /// Number of listing keys currently remembered.
    #[must_use]
    pub fn tracked_listings(&self) -> usize {
        acquire_lock(&self.listings).len()
    }

    /// The wrapped accessor.
    pub const fn inner(&self) -> &A {
        &self.inner
    }

    fn lookup<T: Cacheable>(&self, operation: &'static str, key: &str) -> Lookup<T> {
        match self.cache.get(key) {
            Ok(Some(bytes)) => {
                match CacheEntry::decode(&bytes).map(T::from_entry) {
                    Ok(Some(value)) => Lookup::Hit(value),
                    Ok(None) => {
                        tracing::warn!(operation, key, "Cache entry has unexpected shape, bypassing cache");
                        Lookup::Broken
                    },
                    Err(e) => {
                        tracing::warn!(operation, key, error = %e, "Undecodable cache entry, bypassing cache");
                        Lookup::Broken
                    },
                }
            },
            Ok(None) => Lookup::Miss,
            Err(e) => {
                tracing::warn!(operation, key, error = %e, "Cache read failed, bypassing cache");
                Lookup::Broken
            },
        }
    }

    fn store(&self, key: &str, entry: &CacheEntry, ttl: Duration) {
        let written = entry
            .encode()
            .and_then(|bytes| self.cache.set(key, &bytes, ttl));
        if let Err(e) = written {
            tracing::warn!(key, kind = entry.kind(), error = %e, "Cache write failed");
        }
    }

    fn read_through<T, F>(
        &self,
        operation: &'static str,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Result<T>,
    {
        match self.lookup::<T>(operation, key) {
            Lookup::Hit(value) => {
                tracing::debug!(operation, key, "Cache hit");
                metrics::counter!("cache_requests_total", "operation" => operation, "result" => "hit")
                    .increment(1);
                Ok(value)
            },
            Lookup::Miss => {
                tracing::debug!(operation, key, "Cache miss");
                metrics::counter!("cache_requests_total", "operation" => operation, "result" => "miss")
                    .increment(1);
                let value = load()?;
                self.store(key, &value.to_entry(), ttl);
                Ok(value)
            },
            Lookup::Broken => {
                metrics::counter!("cache_requests_total", "operation" => operation, "result" => "error")
                    .increment(1);
                load()
            },
        }
    }

    /// Like [`Self::read_through`], remembering the key for eviction on delete.
    fn read_through_listing<T, F>(
        &self,
        operation: &'static str,
        key: String,
        ttl: Duration,
        load: F,
    ) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Result<T>,
    {
        let value = self.read_through(operation, &key, ttl, load)?;
        acquire_lock(&self.listings).put(key, ());
        Ok(value)
    }

    /// Writes an idiom under its id and, with its key, under each of its
    /// implementation ids.
    fn recache_idiom(&self, key: StorageKey, idiom: &Idiom) {
        self.store(&idiom_key(idiom.id), &idiom.to_entry(), self.ttls.entity);
        let entry = (key, idiom.clone()).to_entry();
        for implementation in &idiom.implementations {
            self.store(&impl_key(implementation.id), &entry, self.ttls.entity);
        }
    }

    /// Evicts the entries of an idiom and every tracked listing.
    fn uncache_idiom(&self, idiom: &Idiom) {
        let mut keys = vec![idiom_key(idiom.id)];
        keys.extend(idiom.implementations.iter().map(|i| impl_key(i.id)));
        {
            let mut listings = acquire_lock(&self.listings);
            keys.extend(listings.iter().map(|(key, _)| key.clone()));
            listings.clear();
        }
        if let Err(e) = self.cache.delete_multi(&keys) {
            tracing::warn!(idiom_id = %idiom.id, error = %e, "Cache eviction failed");
        }
    }

    fn flush(&self, operation: &'static str) -> Result<()> {
        acquire_lock(&self.listings).clear();
        self.cache.flush().inspect_err(|e| {
            tracing::warn!(operation, error = %e, "Cache flush failed");
        })
    }
}

impl<A: DataAccessor> DataAccessor for CachedAccessor<A> {
    fn get_idiom(&self, ctx: &RequestContext, id: IdiomId) -> Result<(StorageKey, Idiom)> {
        let key = idiom_key(id);
        match self.lookup::<Idiom>("getIdiom", &key) {
            Lookup::Hit(idiom) => {
                metrics::counter!("cache_requests_total", "operation" => "getIdiom", "result" => "hit")
                    .increment(1);
                Ok((StorageKey::for_idiom(id), idiom))
            },
            Lookup::Miss => {
                metrics::counter!("cache_requests_total", "operation" => "getIdiom", "result" => "miss")
                    .increment(1);
                let (key, idiom) = self.inner.get_idiom(ctx, id)?;
                self.recache_idiom(key, &idiom);
                Ok((key, idiom))
            },
            Lookup::Broken => {
                metrics::counter!("cache_requests_total", "operation" => "getIdiom", "result" => "error")
                    .increment(1);
                self.inner.get_idiom(ctx, id)
            },
        }
    }

    fn get_idiom_by_impl_id(
        &self,
        ctx: &RequestContext,
        impl_id: ImplId,
    ) -> Result<(StorageKey, Idiom)> {
        self.read_through("getIdiomByImplID", &impl_key(impl_id), self.ttls.entity, || {
            self.inner.get_idiom_by_impl_id(ctx, impl_id)
        })
    }

    fn save_new_idiom(&self, ctx: &RequestContext, idiom: &mut Idiom) -> Result<StorageKey> {
        let key = self.inner.save_new_idiom(ctx, idiom)?;
        self.recache_idiom(key, idiom);
        Ok(key)
    }

    fn save_existing_idiom(
        &self,
        ctx: &RequestContext,
        key: &StorageKey,
        idiom: &mut Idiom,
    ) -> Result<()> {
        self.inner.save_existing_idiom(ctx, key, idiom)?;
        self.recache_idiom(*key, idiom);
        Ok(())
    }

    fn delete_idiom(&self, ctx: &RequestContext, id: IdiomId) -> Result<()> {
        let loaded = self.inner.get_idiom(ctx, id);
        let result = self.inner.delete_idiom(ctx, id);
        if let Ok((_, idiom)) = loaded {
            self.uncache_idiom(&idiom);
        }
        result
    }

    fn delete_impl(
        &self,
        ctx: &RequestContext,
        idiom_id: IdiomId,
        impl_id: ImplId,
    ) -> Result<()> {
        let loaded = self.inner.get_idiom(ctx, idiom_id);
        let result = self.inner.delete_impl(ctx, idiom_id, impl_id);
        if let Ok((_, idiom)) = loaded {
            self.uncache_idiom(&idiom);
        }
        result
    }

    fn delete_all_idioms(&self, ctx: &RequestContext) -> Result<()> {
        let result = self.inner.delete_all_idioms(ctx);
        // Flushed even when the inner delete failed half-way
        let _ = self.flush("deleteAllIdioms");
        result
    }

    fn get_all_idioms(
        &self,
        ctx: &RequestContext,
        limit: usize,
        order: Option<IdiomOrder>,
    ) -> Result<(Vec<StorageKey>, Vec<Idiom>)> {
        let order_arg = order.map(|o| o.to_string()).unwrap_or_default();
        self.read_through_listing(
            "getAllIdioms",
            format!("getAllIdioms({limit},{order_arg})"),
            self.ttls.all_idioms,
            || self.inner.get_all_idioms(ctx, limit, order),
        )
    }

    fn search_idioms_by_words(
        &self,
        ctx: &RequestContext,
        words: &[String],
        language: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Idiom>> {
        let language_arg = language.map(normalize_language).unwrap_or_default();
        self.read_through_listing(
            "searchIdiomsByWords",
            format!(
                "searchIdiomsByWords({},{language_arg},{limit})",
                list_arg(words, normalize_word)
            ),
            self.ttls.lists,
            || self.inner.search_idioms_by_words(ctx, words, language, limit),
        )
    }

    fn search_idioms_by_words_with_favorites(
        &self,
        ctx: &RequestContext,
        words: &[String],
        favorites: &[String],
        see_non_favorite: bool,
        limit: usize,
    ) -> Result<Vec<Idiom>> {
        if favorites.is_empty() {
            return self.search_idioms_by_words(ctx, words, None, limit);
        }
        // Personalized searches are not cached
        self.inner
            .search_idioms_by_words_with_favorites(ctx, words, favorites, see_non_favorite, limit)
    }

    fn search_idioms_by_langs(
        &self,
        ctx: &RequestContext,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<Idiom>> {
        self.read_through_listing(
            "searchIdiomsByLangs",
            format!(
                "searchIdiomsByLangs({},{limit})",
                list_arg(languages, normalize_language)
            ),
            self.ttls.lists,
            || self.inner.search_idioms_by_langs(ctx, languages, limit),
        )
    }

    fn recent_idioms(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        show_other: bool,
        n: usize,
    ) -> Result<Vec<Idiom>> {
        self.read_through_listing(
            "recentIdioms",
            format!(
                "recentIdioms({},{show_other},{n})",
                list_arg(favorites, normalize_language)
            ),
            self.ttls.lists,
            || self.inner.recent_idioms(ctx, favorites, show_other, n),
        )
    }

    fn popular_idioms(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        show_other: bool,
        n: usize,
    ) -> Result<Vec<Idiom>> {
        self.read_through_listing(
            "popularIdioms",
            format!(
                "popularIdioms({},{show_other},{n})",
                list_arg(favorites, normalize_language)
            ),
            self.ttls.lists,
            || self.inner.popular_idioms(ctx, favorites, show_other, n),
        )
    }

    fn idioms_filter_order(
        &self,
        ctx: &RequestContext,
        favorites: &[String],
        limit_each_lang: usize,
        show_other: bool,
        order: IdiomOrder,
    ) -> Result<Vec<Idiom>> {
        self.inner
            .idioms_filter_order(ctx, favorites, limit_each_lang, show_other, order)
    }

    fn languages_having_impl(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        self.read_through(
            "languagesHavingImpl",
            "languagesHavingImpl()",
            self.ttls.languages,
            || self.inner.languages_having_impl(ctx),
        )
    }

    fn random_idiom(&self, ctx: &RequestContext) -> Result<(StorageKey, Idiom)> {
        self.inner.random_idiom(ctx)
    }

    fn next_idiom_id(&self, ctx: &RequestContext) -> Result<IdiomId> {
        self.inner.next_idiom_id(ctx)
    }

    fn next_impl_id(&self, ctx: &RequestContext) -> Result<ImplId> {
        self.inner.next_impl_id(ctx)
    }

    fn get_app_config(&self, ctx: &RequestContext) -> Result<ApplicationConfig> {
        self.read_through("getAppConfig", "getAppConfig()", self.ttls.app_config, || {
            self.inner.get_app_config(ctx)
        })
    }

    fn save_app_config(&self, ctx: &RequestContext, config: &ApplicationConfig) -> Result<()> {
        let _ = self.flush("saveAppConfig");
        self.inner.save_app_config(ctx, config)
    }

    fn idiom_history(&self, ctx: &RequestContext, id: IdiomId) -> Result<Vec<HistoryItem>> {
        self.inner.idiom_history(ctx, id)
    }

    fn reindex_all(&self, ctx: &RequestContext) -> Result<usize> {
        self.inner.reindex_all(ctx)
    }

    fn delete_cache(&self, ctx: &RequestContext) -> Result<()> {
        self.flush("deleteCache")?;
        self.inner.delete_cache(ctx)
    }
}
