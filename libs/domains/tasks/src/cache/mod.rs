//! Read-side caches layered over the store and the search index.
//!
//! Cache failures never fail a request: reads fall through to the backing
//! contract and writes are logged at `warn` and dropped.

mod redis;
mod search;
mod store;

pub use self::redis::RedisCache;
pub use search::CachedTaskSearch;
pub use store::CachedTaskStore;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::TaskResult;

const KEY_PREFIX: &str = "tasks";

pub fn task_key(id: &str) -> String {
    format!("{KEY_PREFIX}:task:{id}")
}

pub fn search_key(canonical: &str) -> String {
    format!("{KEY_PREFIX}:search:{canonical}")
}

/// Byte-valued key/value cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, cancel: &CancellationToken, key: &str) -> TaskResult<Option<Vec<u8>>>;

    /// Store `value`, expiring after `ttl` when given
    async fn set(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> TaskResult<()>;

    async fn delete(&self, cancel: &CancellationToken, key: &str) -> TaskResult<()>;
}

/// Cached JSON value; any failure reads as a miss.
pub(crate) async fn get_json<C, T>(cache: &C, cancel: &CancellationToken, key: &str) -> Option<T>
where
    C: KeyValueCache + ?Sized,
    T: DeserializeOwned,
{
    match cache.get(cancel, key).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e.chain(), "Cache read failed");
            None
        }
    }
}

pub(crate) async fn set_json<C, T>(
    cache: &C,
    cancel: &CancellationToken,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) where
    C: KeyValueCache + ?Sized,
    T: Serialize,
{
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key, error = %e, "Cache value not serializable");
            return;
        }
    };

    if let Err(e) = cache.set(cancel, key, bytes, ttl).await {
        warn!(key, error = %e.chain(), "Cache write failed");
    }
}

pub(crate) async fn invalidate<C>(cache: &C, cancel: &CancellationToken, key: &str)
where
    C: KeyValueCache + ?Sized,
{
    if let Err(e) = cache.delete(cancel, key).await {
        warn!(key, error = %e.chain(), "Cache invalidation failed");
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-process cache for decorator tests.
    #[derive(Default)]
    pub struct MemoryCache {
        entries: Mutex<HashMap<String, (Vec<u8>, Option<Duration>)>>,
    }

    impl MemoryCache {
        pub fn contains(&self, key: &str) -> bool {
            self.entries.lock().unwrap().contains_key(key)
        }

        pub fn ttl(&self, key: &str) -> Option<Duration> {
            self.entries.lock().unwrap().get(key).and_then(|(_, ttl)| *ttl)
        }

        pub fn value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
            let entries = self.entries.lock().unwrap();
            entries
                .get(key)
                .map(|(bytes, _)| serde_json::from_slice(bytes).unwrap())
        }
    }

    #[async_trait]
    impl KeyValueCache for MemoryCache {
        async fn get(&self, _: &CancellationToken, key: &str) -> TaskResult<Option<Vec<u8>>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(key)
                .map(|(bytes, _)| bytes.clone()))
        }

        async fn set(
            &self,
            _: &CancellationToken,
            key: &str,
            value: Vec<u8>,
            ttl: Option<Duration>,
        ) -> TaskResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value, ttl));
            Ok(())
        }

        async fn delete(&self, _: &CancellationToken, key: &str) -> TaskResult<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
