// TTL cache in front of the SQLite store

pub mod memory;
pub mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use crate::db::{CleanupStats, SqliteStore};
use crate::models::{IndicatorRow, ListedStock, PriceBar, SymbolSnapshot};
use crate::settings::CacheSettings;
use crate::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Key/value store for serialized query results
#[async_trait]
pub trait QueryCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Pick the cache backend from settings, falling back to memory if Redis is unreachable
pub async fn build_cache(settings: &CacheSettings) -> Arc<dyn QueryCache> {
    if let Some(url) = &settings.redis_url {
        match RedisCache::new(url, &settings.key_prefix).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => tracing::warn!("⚠️  Redis cache unavailable ({}), using in-memory cache", e),
        }
    }
    Arc::new(MemoryCache::new())
}

/// Read-through cache over `SqliteStore`; every write clears it
///
/// `generation` is bumped on every invalidation so a read that loaded
/// before a write never leaves its result behind in the cache.
#[derive(Clone)]
pub struct CachedStore {
    store: SqliteStore,
    cache: Arc<dyn QueryCache>,
    ttl: Duration,
    generation: Arc<AtomicU64>,
}

impl CachedStore {
    pub fn new(store: SqliteStore, cache: Arc<dyn QueryCache>, ttl: Duration) -> Self {
        Self {
            store,
            cache,
            ttl,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Direct access for uncached maintenance queries
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    async fn cached<T, F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.cache.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    tracing::debug!("Cache hit: {}", key);
                    return Ok(value);
                }
                Err(e) => tracing::warn!("Discarding unreadable cache entry {}: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let value = load().await?;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Store changed while loading {}, not caching", key);
            return Ok(value);
        }

        match serde_json::to_string(&value) {
            Ok(json) => {
                if let Err(e) = self.cache.set(key, json, self.ttl).await {
                    tracing::warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("Could not serialize {} for cache: {}", key, e),
        }

        // A write may have slipped in between the check and the set
        if self.generation.load(Ordering::SeqCst) != generation {
            self.clear_cache().await;
        }

        Ok(value)
    }

    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.clear_cache().await;
    }

    async fn clear_cache(&self) {
        if let Err(e) = self.cache.clear().await {
            tracing::warn!("Cache clear failed: {}", e);
        }
    }

    // ============== Reads ==============

    pub async fn latest_snapshots(&self) -> Result<Vec<SymbolSnapshot>> {
        self.cached("snapshots", || self.store.latest_snapshots()).await
    }

    pub async fn price_history(&self, symbol: &str, limit: Option<i64>) -> Result<Vec<PriceBar>> {
        let key = format!("history:{}:{}", symbol, limit.unwrap_or(-1));
        self.cached(&key, || self.store.price_history(symbol, limit)).await
    }

    pub async fn latest_prices(&self, symbol: Option<&str>, limit: i64) -> Result<Vec<PriceBar>> {
        let key = format!("latest:{}:{}", symbol.unwrap_or("*"), limit);
        self.cached(&key, || self.store.latest_prices(symbol, limit)).await
    }

    pub async fn symbols_with_data(&self) -> Result<Vec<String>> {
        self.cached("symbols", || self.store.symbols_with_data()).await
    }

    pub async fn count_symbols_with_data(&self) -> Result<i64> {
        self.cached("symbol_count", || self.store.count_symbols_with_data()).await
    }

    // ============== Writes ==============

    pub async fn upsert_universe(&self, stocks: &[ListedStock]) -> Result<usize> {
        let count = self.store.upsert_universe(stocks).await?;
        self.invalidate().await;
        Ok(count)
    }

    /// Persist prices and their indicators, then clear cached reads
    pub async fn store_prices(&self, bars: &[PriceBar], indicators: &[IndicatorRow]) -> Result<()> {
        self.store.upsert_prices(bars).await?;
        self.store.upsert_indicators(indicators).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn cleanup_old_data(&self, days_to_keep: i64) -> Result<CleanupStats> {
        let stats = self.store.cleanup_old_data(days_to_keep).await?;
        self.invalidate().await;
        Ok(stats)
    }
}
