use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::Id;

/// Presence-marker cache that de-duplicates view-count increments.
/// A set key suppresses further increments for the same (post, viewer)
/// pair until the entry expires.
#[async_trait]
pub trait ViewDedupCache: Send + Sync {
    async fn get(&self, key: &str) -> bool;
    async fn set(&self, key: &str, ttl: Duration);
}

pub fn view_key(post_id: Id, user_id: Id) -> String {
    format!("post:{post_id}:user:{user_id}")
}

/// Process-local implementation. Expired entries are evicted lazily on
/// lookup; there is no atomicity between `get` and `set`, so concurrent
/// first views from one user can double-increment (approximate counts are
/// acceptable here).
#[derive(Clone, Default)]
pub struct InMemoryViewCache {
    entries: Arc<DashMap<String, Instant>>,
}

#[async_trait]
impl ViewDedupCache for InMemoryViewCache {
    async fn get(&self, key: &str) -> bool {
        let live = match self.entries.get(key) {
            Some(expiry) => *expiry > Instant::now(),
            None => return false,
        };
        if !live {
            self.entries.remove(key);
        }
        live
    }

    async fn set(&self, key: &str, ttl: Duration) {
        self.entries.insert(key.to_string(), Instant::now() + ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marker_expires_after_ttl() {
        let cache = InMemoryViewCache::default();
        let key = view_key(1, 2);
        assert!(!cache.get(&key).await);

        cache.set(&key, Duration::from_millis(40)).await;
        assert!(cache.get(&key).await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!cache.get(&key).await);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_viewer() {
        let cache = InMemoryViewCache::default();
        cache.set(&view_key(1, 2), Duration::from_secs(60)).await;
        assert!(cache.get(&view_key(1, 2)).await);
        assert!(!cache.get(&view_key(1, 3)).await);
        assert!(!cache.get(&view_key(2, 2)).await);
    }
}
