//! Configuration management.
//!
//! Configuration comes from a TOML file (see [`ConfigFile`]) and is then
//! overridden by `IDIOMSTORE_*` environment variables.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for idiomstore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdiomStoreConfig {
    /// Directory holding the database.
    pub data_dir: PathBuf,
    /// Explicit database file, defaults to `<data_dir>/idioms.db`.
    pub database_path: Option<PathBuf>,
    /// Cache layer settings.
    pub cache: CacheSettings,
    /// Background task settings.
    pub tasks: TaskSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    /// In-process LRU.
    #[default]
    Memory,
    /// Redis server (requires the `redis` feature).
    Redis,
}

impl CacheBackendKind {
    /// Parses a backend name, defaulting to memory.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "redis" => Self::Redis,
            _ => Self::Memory,
        }
    }
}

/// Cache layer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Which backend to use.
    pub backend: CacheBackendKind,
    /// Redis connection URL.
    pub redis_url: Option<String>,
    /// Bound on connecting to Redis and on each read or write.
    pub redis_timeout: Duration,
    /// Maximum number of entries of the in-process backend.
    pub capacity: usize,
    /// Expiration per kind of entry.
    pub ttls: CacheTtls,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url: None,
            redis_timeout: Duration::from_millis(250),
            capacity: 10_000,
            ttls: CacheTtls::default(),
        }
    }
}

/// Expiration of each kind of cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Single idiom lookups, invalidated on write.
    pub entity: Duration,
    /// The unfiltered idiom listing.
    pub all_idioms: Duration,
    /// Search results and ranked lists.
    pub lists: Duration,
    /// The language aggregate.
    pub languages: Duration,
    /// Application configuration.
    pub app_config: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            entity: Duration::from_secs(24 * 3600),
            all_idioms: Duration::from_secs(30),
            lists: Duration::from_secs(10 * 60),
            languages: Duration::from_secs(5 * 60),
            app_config: Duration::from_secs(24 * 3600),
        }
    }
}

/// Background task settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSettings {
    /// Attempts per job before dead-lettering.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound of the retry delay.
    pub max_backoff_ms: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive, e.g. `idiomstore=debug`.
    pub filter: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Database file.
    pub database_path: Option<String>,
    /// Cache section.
    pub cache: Option<ConfigFileCache>,
    /// Tasks section.
    pub tasks: Option<ConfigFileTasks>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Cache section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCache {
    /// `memory` or `redis`.
    pub backend: Option<String>,
    /// Redis URL.
    pub redis_url: Option<String>,
    /// Redis connect and I/O timeout in milliseconds.
    pub redis_timeout_ms: Option<u64>,
    /// LRU capacity.
    pub capacity: Option<usize>,
    /// TTLs in seconds.
    pub ttl: Option<ConfigFileTtl>,
}

/// Cache TTL section in config file, in seconds.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTtl {
    /// Single idiom lookups.
    pub entity: Option<u64>,
    /// Unfiltered listing.
    pub all_idioms: Option<u64>,
    /// Search and ranked lists.
    pub lists: Option<u64>,
    /// Language aggregate.
    pub languages: Option<u64>,
    /// Application configuration.
    pub app_config: Option<u64>,
}

/// Tasks section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTasks {
    /// Attempts per job.
    pub max_attempts: Option<u32>,
    /// First retry delay.
    pub initial_backoff_ms: Option<u64>,
    /// Retry delay cap.
    pub max_backoff_ms: Option<u64>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format.
    pub format: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
}

impl Default for IdiomStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".idiomstore"),
            database_path: None,
            cache: CacheSettings::default(),
            tasks: TaskSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl IdiomStoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("idioms.db"))
    }

    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::upstream("config", "read_config_file", e))?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| crate::Error::InvalidInput(format!("{}: {e}", path.display())))?;

        Ok(Self::from_config_file(file).with_env_overrides())
    }

    /// Loads configuration from the default location.
    ///
    /// Looks for `idiomstore/config.toml` in the platform config directory,
    /// then in `~/.config`. Falls back to defaults plus environment overrides.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let candidates = [
            base_dirs.config_dir().join("idiomstore").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("idiomstore")
                .join("config.toml"),
        ];
        for candidate in candidates {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Ignoring unreadable config file"
                    ),
                }
            }
        }

        let mut config = Self::default();
        config.data_dir = base_dirs.data_dir().join("idiomstore");
        config.with_env_overrides()
    }

    /// Converts a `ConfigFile` to `IdiomStoreConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.database_path = file.database_path.map(PathBuf::from);

        if let Some(cache) = file.cache {
            if let Some(backend) = cache.backend {
                config.cache.backend = CacheBackendKind::parse(&backend);
            }
            config.cache.redis_url = cache.redis_url;
            if let Some(ms) = cache.redis_timeout_ms {
                config.cache.redis_timeout = Duration::from_millis(ms);
            }
            if let Some(capacity) = cache.capacity {
                config.cache.capacity = capacity;
            }
            if let Some(ttl) = cache.ttl {
                let ttls = &mut config.cache.ttls;
                let secs = Duration::from_secs;
                ttls.entity = ttl.entity.map_or(ttls.entity, secs);
                ttls.all_idioms = ttl.all_idioms.map_or(ttls.all_idioms, secs);
                ttls.lists = ttl.lists.map_or(ttls.lists, secs);
                ttls.languages = ttl.languages.map_or(ttls.languages, secs);
                ttls.app_config = ttl.app_config.map_or(ttls.app_config, secs);
            }
        }
        if let Some(tasks) = file.tasks {
            if let Some(v) = tasks.max_attempts {
                config.tasks.max_attempts = v;
            }
            if let Some(v) = tasks.initial_backoff_ms {
                config.tasks.initial_backoff_ms = v;
            }
            if let Some(v) = tasks.max_backoff_ms {
                config.tasks.max_backoff_ms = v;
            }
        }
        if let Some(logging) = file.logging {
            config.logging.format = logging.format;
            config.logging.filter = logging.filter;
        }

        config
    }

    /// Applies `IDIOMSTORE_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies `IDIOMSTORE_*` overrides using `lookup` to read variables.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("IDIOMSTORE_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("IDIOMSTORE_DATABASE") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("IDIOMSTORE_CACHE_BACKEND") {
            self.cache.backend = CacheBackendKind::parse(&v);
        }
        if let Some(v) = lookup("IDIOMSTORE_REDIS_URL") {
            self.cache.redis_url = Some(v);
        }
        if let Some(v) = lookup("IDIOMSTORE_CACHE_CAPACITY") {
            match v.parse() {
                Ok(capacity) => self.cache.capacity = capacity,
                Err(_) => tracing::warn!(value = %v, "Ignoring invalid IDIOMSTORE_CACHE_CAPACITY"),
            }
        }
        if let Some(v) = lookup("IDIOMSTORE_LOG_FORMAT") {
            self.logging.format = Some(v);
        }
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }
}
