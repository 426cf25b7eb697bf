//! Response cache for catalog endpoints.
//!
//! Only slow-changing catalog data (plan types, kernels, regions, LKE
//! versions) is cached. Instance and cluster reads always go to the API.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::trace;

/// How long a cached catalog response stays fresh.
pub const CATALOG_TTL: Duration = Duration::from_secs(15 * 60);

/// Path prefixes whose GET responses may be cached.
const CACHEABLE_PREFIXES: [&str; 4] = ["/linode/types", "/linode/kernels", "/regions", "/lke/versions"];

/// Cached response with its insertion time.
#[derive(Debug, Clone)]
struct Entry {
    stored_at: Instant,
    value: Value,
}

/// TTL cache keyed by request path, query and filter.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CATALOG_TTL)
    }
}

impl ResponseCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True if GET responses for `path` may be cached.
    #[must_use]
    pub fn is_cacheable(path: &str) -> bool {
        CACHEABLE_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Root of a path: its first two segments, e.g. `/linode/types`.
    #[must_use]
    pub fn root_of(path: &str) -> String {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).take(2).collect();
        format!("/{}", segments.join("/"))
    }

    /// Returns a fresh entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                trace!("Cache hit for {key}");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a response.
    pub fn put(&self, key: String, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                Entry {
                    stored_at: Instant::now(),
                    value,
                },
            );
        }
    }

    /// Drops every entry sharing the root path of a written resource.
    pub fn invalidate(&self, written_path: &str) {
        let root = Self::root_of(written_path);
        if let Ok(mut entries) = self.entries.lock() {
            let before = entries.len();
            entries.retain(|key, _| Self::root_of(key) != root);
            if entries.len() != before {
                trace!("Invalidated {} cached response(s) under {root}", before - entries.len());
            }
        }
    }

    /// Number of cached entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_catalog_paths_are_cacheable() {
        assert!(ResponseCache::is_cacheable("/linode/types/g6-nanode-1"));
        assert!(ResponseCache::is_cacheable("/regions"));
        assert!(!ResponseCache::is_cacheable("/linode/instances/12"));
        assert!(!ResponseCache::is_cacheable("/account/events"));
    }

    #[test]
    fn test_root_of() {
        assert_eq!(ResponseCache::root_of("/linode/types/g6-nanode-1"), "/linode/types");
        assert_eq!(ResponseCache::root_of("/regions?page=1"), "/regions");
    }

    #[test]
    fn test_write_invalidates_same_root_only() {
        let cache = ResponseCache::default();
        cache.put("/linode/types/g6-nanode-1".to_string(), json!({"id": "g6-nanode-1"}));
        cache.put("/regions".to_string(), json!({"data": []}));

        cache.invalidate("/linode/types/g6-nanode-1");
        assert!(cache.get("/linode/types/g6-nanode-1").is_none());
        assert!(cache.get("/regions").is_some());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.put("/regions".to_string(), json!({}));
        assert!(cache.get("/regions").is_none());
        assert!(cache.is_empty());
    }
}
