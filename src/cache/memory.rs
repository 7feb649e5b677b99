use super::QueryCache;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache with per-entry expiry
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl QueryCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Also sweeps every expired entry
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let cache = MemoryCache::new();
        assert!(cache.get("a").await.unwrap().is_none());

        cache.set("a", "1".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_evicted() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into(), Duration::from_secs(300)).await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a").await.unwrap().is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sweeps_expired_keys() {
        let cache = MemoryCache::new();
        for i in 0..1000 {
            cache
                .set(&format!("history:SYM{}:60", i), "[]".into(), Duration::from_secs(1))
                .await
                .unwrap();
        }
        cache.set("live", "1".into(), Duration::from_secs(7200)).await.unwrap();
        assert_eq!(cache.len().await, 1001);

        tokio::time::advance(Duration::from_secs(3600)).await;
        cache.set("fresh", "2".into(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("live").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into(), Duration::from_secs(60)).await.unwrap();
        cache.set("b", "2".into(), Duration::from_secs(60)).await.unwrap();

        cache.clear().await.unwrap();
        assert_eq!(cache.len().await, 0);
    }
}
