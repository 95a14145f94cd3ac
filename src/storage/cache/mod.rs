//! Cache backend implementations.

mod memory;

pub use memory::MemoryCacheBackend;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheBackend;
