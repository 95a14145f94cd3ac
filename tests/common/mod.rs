//! Shared helpers for integration tests.
//!
//! Wrappers around the real backends that count calls and fail on demand.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use idiomstore::config::CacheTtls;
use idiomstore::models::{AppConfigProperty, IdiomQuery, SearchDocument};
use idiomstore::storage::{
    MemoryCacheBackend, SqliteHistoryLog, SqliteIndexBackend, SqlitePersistenceBackend,
};
use idiomstore::tasks::RetryPolicy;
use idiomstore::{
    AccessorFactory, AccessorStack, CacheBackend, Error, Idiom, IdiomId, IdiomPersistence,
    ImplId, Implementation, IndexBackend, Result, StorageKey, TextQuery,
};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const DRAIN: Duration = Duration::from_secs(10);

/// Builds an idiom with one implementation per `(impl id, language)`.
pub fn idiom(id: i64, title: &str, impls: &[(i64, &str)]) -> Idiom {
    impls
        .iter()
        .fold(Idiom::new(IdiomId::new(id), title), |idiom, (impl_id, lang)| {
            idiom.with_implementation(Implementation::new(
                ImplId::new(*impl_id),
                *lang,
                format!("// {title} in {lang}"),
            ))
        })
}

pub fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

pub fn titles(idioms: &[Idiom]) -> Vec<String> {
    idioms.iter().map(|i| i.title.clone()).collect()
}

fn injected(backend: &'static str, operation: &str) -> Error {
    Error::upstream(backend, operation, "injected failure")
}

/// Primary store counting reads.
///
/// The idiom holding the max implementation id can be replaced, to reach
/// states the SQLite store never produces.
pub struct CountingPersistence {
    inner: SqlitePersistenceBackend,
    pub gets: AtomicUsize,
    pub queries: AtomicUsize,
    max_impl_holder: Mutex<Option<Idiom>>,
}

impl CountingPersistence {
    pub fn new() -> Self {
        Self {
            inner: SqlitePersistenceBackend::in_memory().unwrap(),
            gets: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            max_impl_holder: Mutex::new(None),
        }
    }

    pub fn set_max_impl_holder(&self, idiom: Idiom) {
        *self.max_impl_holder.lock().unwrap() = Some(idiom);
    }

    pub fn reads(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.queries.load(Ordering::SeqCst)
    }
}

impl IdiomPersistence for CountingPersistence {
    fn get(&self, key: &StorageKey) -> Result<Option<Idiom>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn get_batch(&self, keys: &[StorageKey]) -> Result<Vec<Option<Idiom>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_batch(keys)
    }

    fn put(&self, key: &StorageKey, idiom: &Idiom) -> Result<()> {
        self.inner.put(key, idiom)
    }

    fn delete(&self, key: &StorageKey) -> Result<bool> {
        self.inner.delete(key)
    }

    fn list_keys(&self) -> Result<Vec<StorageKey>> {
        self.inner.list_keys()
    }

    fn query(&self, query: &IdiomQuery) -> Result<Vec<(StorageKey, Idiom)>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }

    fn find_by_impl_id(&self, impl_id: ImplId) -> Result<Vec<(StorageKey, Idiom)>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_impl_id(impl_id)
    }

    fn idiom_with_max_impl_id(&self) -> Result<Option<(StorageKey, Idiom)>> {
        if let Some(holder) = self.max_impl_holder.lock().unwrap().clone() {
            return Ok(Some((StorageKey::for_idiom(holder.id), holder)));
        }
        self.inner.idiom_with_max_impl_id()
    }

    fn first_language_per_idiom(&self) -> Result<Vec<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.first_language_per_idiom()
    }

    fn load_app_config(&self) -> Result<Vec<AppConfigProperty>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.load_app_config()
    }

    fn save_app_config(&self, properties: &[AppConfigProperty]) -> Result<()> {
        self.inner.save_app_config(properties)
    }
}

/// Search index whose searches start failing after a number of calls,
/// and whose writes and removals can be switched off.
pub struct FaultyIndex {
    inner: SqliteIndexBackend,
    searches_left: AtomicUsize,
    pub fail_puts: AtomicBool,
    pub fail_removes: AtomicBool,
}

impl FaultyIndex {
    pub fn new() -> Self {
        Self {
            inner: SqliteIndexBackend::in_memory().unwrap(),
            searches_left: AtomicUsize::new(usize::MAX),
            fail_puts: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
        }
    }

    /// Lets `n` more searches succeed, failing every later one.
    pub fn fail_searches_after(&self, n: usize) {
        self.searches_left.store(n, Ordering::SeqCst);
    }
}

impl IndexBackend for FaultyIndex {
    fn put(&self, document: &SearchDocument) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(injected("fts5", "put"));
        }
        self.inner.put(document)
    }

    fn remove(&self, doc_id: &str) -> Result<bool> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(injected("fts5", "remove"));
        }
        self.inner.remove(doc_id)
    }

    fn search(&self, query: &TextQuery, limit: usize) -> Result<Vec<String>> {
        let allowed = self
            .searches_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(injected("fts5", "search"));
        }
        self.inner.search(query, limit)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}

/// Cache that can be switched to fail every call.
pub struct FlakyCache {
    inner: MemoryCacheBackend,
    pub broken: AtomicBool,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryCacheBackend::default(),
            broken: AtomicBool::new(false),
        }
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(injected("cache", operation));
        }
        Ok(())
    }
}

impl CacheBackend for FlakyCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check("get")?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.check("set")?;
        self.inner.set(key, value, ttl)
    }

    fn delete_multi(&self, keys: &[String]) -> Result<()> {
        self.check("delete_multi")?;
        self.inner.delete_multi(keys)
    }

    fn flush(&self) -> Result<()> {
        self.check("flush")?;
        self.inner.flush()
    }
}

/// A stack over the instrumented backends.
pub struct Harness {
    pub stack: AccessorStack,
    pub persistence: Arc<CountingPersistence>,
    pub index: Arc<FaultyIndex>,
    pub cache: Arc<FlakyCache>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::no_retry())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::build(policy, CacheTtls::default())
    }

    pub fn with_ttls(ttls: CacheTtls) -> Self {
        Self::build(RetryPolicy::no_retry(), ttls)
    }

    fn build(policy: RetryPolicy, ttls: CacheTtls) -> Self {
        let persistence = Arc::new(CountingPersistence::new());
        let index = Arc::new(FaultyIndex::new());
        let cache = Arc::new(FlakyCache::new());
        let stack = AccessorFactory::assemble(
            persistence.clone(),
            index.clone(),
            Arc::new(SqliteHistoryLog::in_memory().unwrap()),
            cache.clone(),
            ttls,
            policy,
        )
        .unwrap();
        Self {
            stack,
            persistence,
            index,
            cache,
        }
    }

    pub fn drain(&self) {
        assert!(self.stack.wait_idle(DRAIN), "background jobs did not drain");
    }
}
