//! Memoizing cache for remote responses.
//!
//! Each key owns a [`OnceCell`]; concurrent lookups for the same key wait on
//! that cell, so a value is computed at most once. A failed computation
//! leaves the cell empty and the next lookup computes again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::metrics;

/// Normalized cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for free text, ignoring surrounding whitespace.
    pub fn text(input: &str) -> Self {
        Self(input.trim().to_string())
    }

    /// Key for several fields. Each field is length-prefixed so that field
    /// contents can never forge a separator.
    pub fn composite<S: AsRef<str>>(fields: &[S]) -> Self {
        let key = fields
            .iter()
            .map(|field| {
                let field = field.as_ref();
                format!("{}:{}", field.len(), field)
            })
            .collect::<Vec<_>>()
            .join("|");
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: DateTime<Utc>,
}

/// Response cache. Entries live as long as the cache; nothing is evicted.
#[derive(Debug)]
pub struct ResponseCache<V> {
    name: String,
    slots: Mutex<HashMap<String, Arc<OnceCell<CacheEntry<V>>>>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self, key: &CacheKey) -> Arc<OnceCell<CacheEntry<V>>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key.as_str().to_string()).or_default())
    }

    /// Return the cached value for `key`, or run `compute` and store its
    /// successful result.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key);
        let mut missed = false;

        let entry = slot
            .get_or_try_init(|| {
                missed = true;
                let key = key.as_str().to_string();
                async move {
                    let value = compute().await?;
                    Ok(CacheEntry {
                        key,
                        value,
                        created_at: Utc::now(),
                    })
                }
            })
            .await?;

        metrics::record_cache_lookup(&self.name, !missed);
        if !missed {
            debug!(cache = %self.name, key = %key.as_str(), "Cache hit");
        }

        Ok(entry.value.clone())
    }

    /// Cached value without computing.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(key.as_str())
            .and_then(|slot| slot.get())
            .map(|entry| entry.value.clone())
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_text_key_trims() {
        assert_eq!(CacheKey::text("  hello world \n"), CacheKey::text("hello world"));
        assert_ne!(CacheKey::text("hello"), CacheKey::text("Hello"));
    }

    #[test]
    fn test_composite_keys_do_not_collide() {
        let a = CacheKey::composite(&["a|b", "c"]);
        let b = CacheKey::composite(&["a", "b|c"]);
        assert_ne!(a, b);
        assert_eq!(
            CacheKey::composite(&["ocean", "1", "1080x1920"]).as_str(),
            "5:ocean|1:1|9:1080x1920"
        );
    }

    #[tokio::test]
    async fn test_computes_once() {
        let cache = ResponseCache::new("test");
        let calls = AtomicU32::new(0);
        let key = CacheKey::text("sentence");

        for _ in 0..3 {
            let value = cache
                .get_or_compute(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec!["a".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["a".to_string()]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key), Some(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache: ResponseCache<u32> = ResponseCache::new("test");
        let key = CacheKey::text("k");

        let first = cache.get_or_compute(&key, || async { Err::<u32, _>("boom") }).await;
        assert_eq!(first, Err("boom"));
        assert!(cache.is_empty());

        let second = cache.get_or_compute(&key, || async { Ok::<_, &str>(7) }).await;
        assert_eq!(second, Ok(7));
        assert_eq!(cache.get(&key), Some(7));
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_computation() {
        let cache = Arc::new(ResponseCache::new("test"));
        let calls = Arc::new(AtomicU32::new(0));
        let key = CacheKey::text("shared");

        let lookups = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>(99u32)
                    })
                    .await
            })
        });

        for result in futures::future::join_all(lookups).await {
            assert_eq!(result.unwrap().unwrap(), 99);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
