use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::Instant;

use crate::ApiResponse;

#[derive(Clone, Debug)]
struct CacheEntry {
    response: ApiResponse,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Memoizes successful GET responses for a fixed TTL.
///
/// Eviction is lazy: an entry is only removed when a lookup finds it
/// expired. There is no size bound.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a live entry; an expired one is deleted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<ApiResponse> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `response`, replacing any previous entry for `key`.
    pub fn set(&self, key: impl Into<String>, response: ApiResponse) {
        let entry = CacheEntry {
            response,
            expires_at: Instant::now().checked_add(self.ttl),
        };
        self.lock().insert(key.into(), entry);
    }

    /// Deletes the entry if it has expired. Returns `true` when something was removed.
    pub fn invalidate_if_expired(&self, key: &str) -> bool {
        let mut entries = self.lock();
        let expired = entries
            .get(key)
            .is_some_and(|entry| !entry.is_live(Instant::now()));
        if expired {
            entries.remove(key);
        }
        expired
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::ResponseCache;
    use crate::ApiResponse;

    #[tokio::test(start_paused = true)]
    async fn entry_is_served_until_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(300));
        cache.set("/merchants{}", ApiResponse::new(200, json!([1, 2])));

        tokio::time::advance(Duration::from_secs(299)).await;
        let hit = cache.get("/merchants{}").expect("entry must still be live");
        assert_eq!(hit.data, json!([1, 2]));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("/merchants{}").is_none());
        assert!(cache.is_empty(), "expired entry must be deleted on lookup");
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_restarts_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(10));
        cache.set("k", ApiResponse::new(200, json!("old")));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", ApiResponse::new(200, json!("new")));
        tokio::time::advance(Duration::from_secs(8)).await;

        let hit = cache.get("k").expect("refreshed entry must be live");
        assert_eq!(hit.data, json!("new"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_if_expired_only_removes_stale_entries() {
        let cache = ResponseCache::new(Duration::from_secs(5));
        cache.set("k", ApiResponse::new(200, json!(1)));
        assert!(!cache.invalidate_if_expired("k"));
        assert!(!cache.invalidate_if_expired("missing"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.invalidate_if_expired("k"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_ttl_never_expires() {
        let cache = ResponseCache::new(Duration::MAX);
        cache.set("k", ApiResponse::new(200, json!(1)));

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert!(cache.get("k").is_some());
        assert!(!cache.invalidate_if_expired("k"));
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.set("a", ApiResponse::new(200, json!(1)));
        cache.set("b", ApiResponse::new(200, json!(2)));
        cache.clear();
        assert!(cache.is_empty());
    }
}
