//! Accessor stack assembly.
//!
//! ```text
//! AccessorFactory
//!   ├── persistence  → SqlitePersistenceBackend ─┐
//!   ├── index        → SqliteIndexBackend        ├─ JobExecutor → BackgroundTaskRunner
//!   ├── history      → SqliteHistoryLog         ─┘
//!   ├── StoreAccessor(persistence, index, history, runner)
//!   └── CachedAccessor(StoreAccessor, cache backend, TTLs)
//! ```
//!
//! The three `SQLite` stores share one database file but each owns its
//! connection.

use crate::accessor::{CachedAccessor, StoreAccessor};
use crate::config::{CacheBackendKind, CacheSettings, CacheTtls, IdiomStoreConfig};
use crate::storage::{
    CacheBackend, HistoryLog, IdiomPersistence, IndexBackend, MemoryCacheBackend,
    SqliteHistoryLog, SqliteIndexBackend, SqlitePersistenceBackend,
};
use crate::tasks::{BackgroundTaskRunner, JobExecutor, RetryPolicy};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// A ready-to-use accessor and the resources behind it.
pub struct AccessorStack {
    /// The accessor callers use.
    pub accessor: CachedAccessor<StoreAccessor>,
    /// Runner of the indexing and history jobs.
    pub runner: Arc<BackgroundTaskRunner>,
    /// The cache under the accessor.
    pub cache: Arc<dyn CacheBackend>,
}

impl AccessorStack {
    /// Waits for background jobs to drain.
    ///
    /// Returns false if jobs are still pending after `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.runner.wait_idle(timeout)
    }
}

/// Builds accessor stacks.
pub struct AccessorFactory;

impl AccessorFactory {
    /// Builds the full stack described by `config`, creating the data
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory, the database or the cache
    /// backend cannot be opened, or the task worker cannot start.
    pub fn from_config(config: &IdiomStoreConfig) -> Result<AccessorStack> {
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::upstream("fs", "create_data_dir", e))?;
        }
        tracing::debug!(path = %db_path.display(), "Opening idiom database");

        let persistence = Arc::new(SqlitePersistenceBackend::new(&db_path)?);
        let index = Arc::new(SqliteIndexBackend::new(&db_path)?);
        let history = Arc::new(SqliteHistoryLog::new(&db_path)?);
        let cache = Self::create_cache_backend(&config.cache)?;

        let stack = Self::assemble(
            persistence,
            index,
            history,
            cache,
            config.cache.ttls,
            RetryPolicy::from_settings(&config.tasks),
        )?;
        stack.accessor.limit_tracked_listings(config.cache.capacity);
        Ok(stack)
    }

    /// Builds a stack over in-memory stores and an in-process cache.
    ///
    /// # Errors
    ///
    /// Returns an error if an in-memory database cannot be opened.
    pub fn in_memory(ttls: CacheTtls) -> Result<AccessorStack> {
        Self::assemble(
            Arc::new(SqlitePersistenceBackend::in_memory()?),
            Arc::new(SqliteIndexBackend::in_memory()?),
            Arc::new(SqliteHistoryLog::in_memory()?),
            Arc::new(MemoryCacheBackend::default()),
            ttls,
            RetryPolicy::default(),
        )
    }

    /// Wires given stores into a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the task worker cannot start.
    pub fn assemble(
        persistence: Arc<dyn IdiomPersistence>,
        index: Arc<dyn IndexBackend>,
        history: Arc<dyn HistoryLog>,
        cache: Arc<dyn CacheBackend>,
        ttls: CacheTtls,
        policy: RetryPolicy,
    ) -> Result<AccessorStack> {
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&persistence),
            Arc::clone(&index),
            Arc::clone(&history),
        ));
        let runner = Arc::new(BackgroundTaskRunner::start(executor, policy)?);
        let store = StoreAccessor::new(persistence, index, history, runner.clone());

        Ok(AccessorStack {
            accessor: CachedAccessor::new(store, Arc::clone(&cache), ttls),
            runner,
            cache,
        })
    }

    /// Creates the configured cache backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when Redis is requested without the
    /// `redis` feature, [`Error::InvalidInput`] when it lacks a URL.
    pub fn create_cache_backend(settings: &CacheSettings) -> Result<Arc<dyn CacheBackend>> {
        match settings.backend {
            CacheBackendKind::Memory => {
                tracing::debug!(capacity = settings.capacity, "Using in-process cache");
                Ok(Arc::new(MemoryCacheBackend::new(settings.capacity)))
            },
            CacheBackendKind::Redis => Self::create_redis_backend(settings),
        }
    }

    #[cfg(feature = "redis")]
    fn create_redis_backend(settings: &CacheSettings) -> Result<Arc<dyn CacheBackend>> {
        let url = settings.redis_url.as_deref().ok_or_else(|| {
            Error::InvalidInput("redis cache backend needs a redis_url".to_string())
        })?;
        tracing::debug!("Using Redis cache");
        Ok(Arc::new(crate::storage::RedisCacheBackend::with_timeout(
            url,
            settings.redis_timeout,
        )?))
    }

    #[cfg(not(feature = "redis"))]
    fn create_redis_backend(_settings: &CacheSettings) -> Result<Arc<dyn CacheBackend>> {
        Err(Error::Unsupported(
            "redis cache backend requires the 'redis' feature".to_string(),
        ))
    }
}
