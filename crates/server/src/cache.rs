//! String-keyed TTL cache.
//!
//! Backed by Redis when `REDIS_URL` is configured, otherwise by an in-process
//! `moka` cache. Values are stored as JSON so both backends share one format.

use std::time::{Duration, Instant};

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Upper bound on any in-process entry's lifetime.
const MEMORY_MAX_TTL: Duration = Duration::from_secs(60 * 60);
const MEMORY_MAX_ENTRIES: u64 = 10_000;

/// Errors from the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
enum Backend {
    Memory(moka::future::Cache<String, (Instant, String)>),
    Redis(ConnectionManager),
}

/// Shared cache handle, cheap to clone.
#[derive(Clone)]
pub struct Cache {
    backend: Backend,
}

impl Cache {
    /// In-process cache.
    #[must_use]
    pub fn memory() -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(MEMORY_MAX_ENTRIES)
            .time_to_live(MEMORY_MAX_TTL)
            .build();
        Self {
            backend: Backend::Memory(cache),
        }
    }

    /// Redis-backed cache.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Redis` if the URL is invalid or the first
    /// connection cannot be established.
    pub async fn redis(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            backend: Backend::Redis(manager),
        })
    }

    /// Name of the active backend, for logging.
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        }
    }

    /// Read and decode a cached value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend fails or the stored value does not decode.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let raw = match &self.backend {
            Backend::Memory(cache) => match cache.get(key).await {
                Some((deadline, value)) if Instant::now() < deadline => Some(value),
                Some(_) => {
                    cache.invalidate(key).await;
                    None
                }
                None => None,
            },
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                conn.get::<_, Option<String>>(key).await?
            }
        };

        raw.map(|value| serde_json::from_str(&value))
            .transpose()
            .map_err(CacheError::from)
    }

    /// Encode and store a value for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if encoding or the backend fails.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        match &self.backend {
            Backend::Memory(cache) => {
                cache.insert(key.to_owned(), (Instant::now() + ttl, raw)).await;
            }
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                conn.set_ex::<_, _, ()>(key, raw, ttl.as_secs().max(1)).await?;
            }
        }
        Ok(())
    }

    /// Drop a key.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Redis` if the backend fails.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        match &self.backend {
            Backend::Memory(cache) => cache.invalidate(key).await,
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                conn.del::<_, ()>(key).await?;
            }
        }
        Ok(())
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Cache failures are logged and fall through to `compute`.
    ///
    /// # Errors
    ///
    /// Returns whatever `compute` returns.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get_json::<T>(key).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "cache read failed"),
        }

        let value = compute().await?;
        if let Err(e) = self.set_json(key, &value, ttl).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_round_trip_and_invalidate() {
        let cache = Cache::memory();
        cache
            .set_json("categories", &vec!["mugs", "tea"], Duration::from_secs(60))
            .await
            .unwrap();

        let hit: Option<Vec<String>> = cache.get_json("categories").await.unwrap();
        assert_eq!(hit, Some(vec!["mugs".to_owned(), "tea".to_owned()]));

        cache.invalidate("categories").await.unwrap();
        let miss: Option<Vec<String>> = cache.get_json("categories").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn memory_entries_expire() {
        let cache = Cache::memory();
        cache
            .set_json("report:total_orders", &3_i64, Duration::ZERO)
            .await
            .unwrap();
        let value: Option<i64> = cache.get_json("report:total_orders").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn get_or_compute_only_computes_on_miss() {
        let cache = Cache::memory();
        let first: Result<i64, ()> = cache
            .get_or_compute("k", Duration::from_secs(60), || async { Ok(1) })
            .await;
        let second: Result<i64, ()> = cache
            .get_or_compute("k", Duration::from_secs(60), || async { Ok(2) })
            .await;
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
    }
}
