//! Cache backend trait.

use crate::Result;
use std::time::Duration;

/// Expiring key/value store of encoded bytes.
///
/// Errors are reported, never hidden: the cache layer decides to degrade
/// them to misses.
pub trait CacheBackend: Send + Sync {
    /// Reads a value. Expired entries are misses.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a value expiring after `ttl`.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Removes several keys. Missing keys are ignored.
    fn delete_multi(&self, keys: &[String]) -> Result<()>;

    /// Removes everything.
    fn flush(&self) -> Result<()>;
}
