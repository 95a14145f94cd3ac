//! Redis cache backend.

use crate::storage::traits::CacheBackend;
use crate::{Error, Result};
use redis::{Client, Commands, Connection};
use std::time::Duration;

/// Keys requested per `SCAN` round trip when flushing.
const SCAN_BATCH: usize = 500;

/// Cache stored in a Redis database.
///
/// Keys are namespaced with a prefix; `flush` only removes prefixed keys so
/// that a shared database is left alone. Connecting and every read or write
/// are bounded by a timeout, so an unreachable server fails fast.
pub struct RedisCacheBackend {
    client: Client,
    prefix: String,
    timeout: Duration,
}

impl RedisCacheBackend {
    /// Default bound on connecting and on each command.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

    /// Connects to the Redis server at `connection_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub fn new(connection_url: &str) -> Result<Self> {
        Self::with_timeout(connection_url, Self::DEFAULT_TIMEOUT)
    }

    /// Connects with an explicit connect and I/O timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server does not answer
    /// within `timeout`.
    pub fn with_timeout(connection_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::open(connection_url).map_err(redis_error("redis_connect"))?;
        let backend = Self {
            client,
            prefix: "idiomstore:".to_string(),
            // Zero would mean blocking reads
            timeout: timeout.max(Duration::from_millis(1)),
        };
        // Fail early on an unreachable server
        backend.get_connection()?;
        Ok(backend)
    }

    fn get_connection(&self) -> Result<Connection> {
        let conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(redis_error("redis_get_connection"))?;
        conn.set_read_timeout(Some(self.timeout))
            .map_err(redis_error("redis_set_read_timeout"))?;
        conn.set_write_timeout(Some(self.timeout))
            .map_err(redis_error("redis_set_write_timeout"))?;
        Ok(conn)
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

fn redis_error(operation: &'static str) -> impl Fn(redis::RedisError) -> Error {
    move |e| Error::upstream("redis", operation, e)
}

impl CacheBackend for RedisCacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection()?;
        conn.get(self.key(key)).map_err(redis_error("redis_get"))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection()?;
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query::<()>(&mut conn)
            .map_err(redis_error("redis_set"))
    }

    fn delete_multi(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.get_connection()?;
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        conn.del(keys).map_err(redis_error("redis_del"))
    }

    /// Removes every prefixed key, walking the keyspace with `SCAN`.
    fn flush(&self) -> Result<()> {
        let mut conn = self.get_connection()?;
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query(&mut conn)
                .map_err(redis_error("redis_scan"))?;
            if !keys.is_empty() {
                conn.del::<_, ()>(keys).map_err(redis_error("redis_flush"))?;
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}
