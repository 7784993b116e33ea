use std::collections::HashMap;
use std::sync::Mutex;

use crate::api_defaults::DEFAULT_CACHE_MEMORY_BYTES;
use crate::cache::{Cache, StoragePolicy};
use crate::error;
use crate::http::RequestDescriptor;
use crate::io::HttpResponse;

use crate::Result;

/// Byte budgeted in-memory response store with least recently used
/// replacement. The mutex makes store/lookup atomic per key, which is all
/// concurrent dispatches require.
pub struct InMemoryCache {
    max_bytes: usize,
    state: Mutex<LruState>,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<String, StoredEntry>,
    used_bytes: usize,
    tick: u64,
}

struct StoredEntry {
    response: HttpResponse,
    size: usize,
    last_used: u64,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::with_budget(DEFAULT_CACHE_MEMORY_BYTES)
    }
}

impl InMemoryCache {
    pub fn with_budget(max_bytes: usize) -> Self {
        InMemoryCache {
            max_bytes,
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LruState {
    fn evict_lru(&mut self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = lru_key {
            if let Some(entry) = self.entries.remove(&key) {
                self.used_bytes -= entry.size;
                debug!("memory cache evicted entry {}", key);
            }
        }
    }
}

impl Cache for InMemoryCache {
    fn lookup(&self, key: &RequestDescriptor) -> Result<Option<HttpResponse>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| error::gen("memory cache lock poisoned"))?;
        state.tick += 1;
        let tick = state.tick;
        if let Some(entry) = state.entries.get_mut(&key.cache_key()) {
            entry.last_used = tick;
            return Ok(Some(entry.response.clone()));
        }
        Ok(None)
    }

    fn store(&self, key: &RequestDescriptor, value: &HttpResponse) -> Result<()> {
        if !StoragePolicy::for_response(value).allowed() {
            return Ok(());
        }
        let size = value.size_bytes();
        let mut state = self
            .state
            .lock()
            .map_err(|_| error::gen("memory cache lock poisoned"))?;
        state.tick += 1;
        let tick = state.tick;
        // Last write wins per key.
        if let Some(old) = state.entries.remove(&key.cache_key()) {
            state.used_bytes -= old.size;
        }
        state.entries.insert(
            key.cache_key(),
            StoredEntry {
                response: value.clone(),
                size,
                last_used: tick,
            },
        );
        state.used_bytes += size;
        while state.used_bytes > self.max_bytes && !state.entries.is_empty() {
            state.evict_lru();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http::{Headers, Method};

    fn descriptor(url: &str) -> RequestDescriptor {
        RequestDescriptor::new(Method::GET, url, Headers::new())
    }

    fn response(body: &str) -> HttpResponse {
        HttpResponse::builder()
            .status(200)
            .body(body.to_string())
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let cache = InMemoryCache::default();
        let key = descriptor("https://cdn.example.io/v3/assets");
        assert!(cache.lookup(&key).unwrap().is_none());
    }

    #[test]
    fn test_store_then_lookup_round_trip() {
        let cache = InMemoryCache::default();
        let key = descriptor("https://cdn.example.io/v3/assets");
        cache.store(&key, &response("payload")).unwrap();
        let hit = cache.lookup(&key).unwrap().unwrap();
        assert_eq!("payload", hit.body);
    }

    #[test]
    fn test_failed_responses_are_not_stored() {
        let cache = InMemoryCache::default();
        let key = descriptor("https://cdn.example.io/v3/assets");
        let not_found = HttpResponse::builder()
            .status(404)
            .body("nope".to_string())
            .build()
            .unwrap();
        cache.store(&key, &not_found).unwrap();
        assert!(cache.lookup(&key).unwrap().is_none());
    }

    #[test]
    fn test_last_write_wins_per_key() {
        let cache = InMemoryCache::default();
        let key = descriptor("https://cdn.example.io/v3/assets");
        cache.store(&key, &response("first")).unwrap();
        cache.store(&key, &response("second")).unwrap();
        assert_eq!(1, cache.len());
        assert_eq!("second", cache.lookup(&key).unwrap().unwrap().body);
    }

    #[test]
    fn test_lru_eviction_over_budget() {
        // Budget fits two of the three bodies.
        let cache = InMemoryCache::with_budget(16);
        let key_a = descriptor("https://cdn.example.io/v3/a");
        let key_b = descriptor("https://cdn.example.io/v3/b");
        let key_c = descriptor("https://cdn.example.io/v3/c");
        cache.store(&key_a, &response("aaaaaaaa")).unwrap();
        cache.store(&key_b, &response("bbbbbbbb")).unwrap();
        // Touch a so that b becomes the least recently used.
        cache.lookup(&key_a).unwrap();
        cache.store(&key_c, &response("cccccccc")).unwrap();
        assert!(cache.lookup(&key_b).unwrap().is_none());
        assert!(cache.lookup(&key_a).unwrap().is_some());
        assert!(cache.lookup(&key_c).unwrap().is_some());
    }
}
