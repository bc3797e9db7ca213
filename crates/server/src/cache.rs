use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

/// Short-lived store for serialized GET responses.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Duration);
    fn delete(&self, key: &str);
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let guard = self.inner.read();
            match guard.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.inner.write().remove(key);
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut guard = self.inner.write();
        guard.retain(|_, entry| entry.expires_at > now);
        guard.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.inner.write().remove(key);
    }
}

/// Cache that never stores anything.
#[derive(Clone, Copy, Default)]
pub struct NoopCache;

impl ResponseCache for NoopCache {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Duration) {}

    fn delete(&self, _key: &str) {}
}

pub fn collections_key(owner: &str) -> String {
    format!("collections:{}", owner)
}

pub fn collection_key(owner: &str, collection_id: &str) -> String {
    format!("collection:{}:{}", owner, collection_id)
}

/// Drops every cached view that includes `collection_id`.
pub fn invalidate_collection(cache: &dyn ResponseCache, owner: &str, collection_id: &str) {
    cache.delete(&collections_key(owner));
    cache.delete(&collection_key(owner, collection_id));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{
        collection_key, collections_key, invalidate_collection, MemoryCache, NoopCache,
        ResponseCache,
    };

    #[test]
    fn stores_until_deleted() {
        let cache = MemoryCache::new();
        cache.set("a", json!({"n": 1}), Duration::from_secs(60));
        assert_eq!(cache.get("a"), Some(json!({"n": 1})));
        cache.delete("a");
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = MemoryCache::new();
        cache.set("a", json!(1), Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn zero_ttl_is_not_stored() {
        let cache = MemoryCache::new();
        cache.set("a", json!(1), Duration::ZERO);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn noop_cache_never_hits() {
        let cache = NoopCache;
        cache.set("a", json!(1), Duration::from_secs(60));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn invalidation_covers_list_and_detail() {
        let cache = MemoryCache::new();
        cache.set(&collections_key("u1"), json!([]), Duration::from_secs(60));
        cache.set(&collection_key("u1", "c1"), json!({}), Duration::from_secs(60));
        cache.set(&collection_key("u1", "c2"), json!({}), Duration::from_secs(60));
        invalidate_collection(&cache, "u1", "c1");
        assert_eq!(cache.get(&collections_key("u1")), None);
        assert_eq!(cache.get(&collection_key("u1", "c1")), None);
        assert!(cache.get(&collection_key("u1", "c2")).is_some());
    }
}
