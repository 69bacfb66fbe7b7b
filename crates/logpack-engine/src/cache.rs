//! Pack metadata caching
//!
//! Keeps recently fetched [`PackMeta`] in memory so reopening a pack within
//! the TTL does not hit the server again.

use crate::api::PackMeta;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    meta: PackMeta,
    expires_at: DateTime<Utc>,
}

/// In-memory TTL cache keyed by pack id
#[derive(Debug, Clone)]
pub struct MetaCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl MetaCache {
    pub fn new(ttl_minutes: i64) -> Self {
        Self::with_ttl(Duration::minutes(ttl_minutes))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, pack_id: &str) -> Option<PackMeta> {
        self.get_at(pack_id, Utc::now())
    }

    /// Look up `pack_id` as of `now`, evicting it if expired
    pub fn get_at(&mut self, pack_id: &str, now: DateTime<Utc>) -> Option<PackMeta> {
        match self.entries.get(pack_id) {
            Some(entry) if now < entry.expires_at => {
                debug!(pack_id, "Metadata cache hit");
                Some(entry.meta.clone())
            },
            Some(_) => {
                debug!(pack_id, "Metadata cache entry expired");
                self.entries.remove(pack_id);
                None
            },
            None => None,
        }
    }

    pub fn insert(&mut self, meta: PackMeta) {
        self.insert_at(meta, Utc::now());
    }

    /// Store `meta` as of `now`, pruning every entry that has already expired
    pub fn insert_at(&mut self, meta: PackMeta, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        if self.entries.len() < before {
            debug!(pruned = before - self.entries.len(), "Pruned expired metadata");
        }

        let entry = CacheEntry {
            expires_at: now + self.ttl,
            meta,
        };
        self.entries.insert(entry.meta.pack_id.clone(), entry);
    }

    pub fn invalidate(&mut self, pack_id: &str) -> bool {
        self.entries.remove(pack_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn meta(pack_id: &str) -> PackMeta {
        PackMeta {
            pack_id: pack_id.to_string(),
            title: "Starter".to_string(),
            description: String::new(),
            r2_key: None,
            sha256: None,
            size_bytes: None,
            sources: Vec::new(),
            difficulty: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = MetaCache::new(5);
        let now = Utc::now();
        cache.insert_at(meta("a"), now);
        assert_eq!(cache.get_at("a", now + Duration::minutes(4)).unwrap().pack_id, "a");
        assert!(cache.get_at("b", now).is_none());
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let mut cache = MetaCache::new(5);
        let now = Utc::now();
        cache.insert_at(meta("a"), now);
        assert!(cache.get_at("a", now + Duration::minutes(5)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_prunes_expired_entries() {
        let mut cache = MetaCache::new(5);
        let now = Utc::now();
        cache.insert_at(meta("a"), now);
        cache.insert_at(meta("b"), now + Duration::minutes(3));
        cache.insert_at(meta("c"), now + Duration::minutes(6));
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("b", now + Duration::minutes(6)).is_some());
        assert!(cache.get_at("a", now + Duration::minutes(6)).is_none());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache = MetaCache::with_ttl(Duration::seconds(30));
        cache.insert(meta("a"));
        cache.insert(meta("b"));
        assert_eq!(cache.len(), 2);
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        cache.clear();
        assert!(cache.get("b").is_none());
    }
}
