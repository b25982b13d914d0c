//! Bounded resource storage.
//!
//! Keys are absolute URLs. Reads and writes both count as access for LRU
//! ordering; the store knows nothing about subscribers, so callers publish
//! after every write that should be observed.

use std::sync::Mutex;

use lru::LruCache;
use metrics::counter;
use tracing::debug;

use crate::document::Document;
use crate::links::LinkMap;

use super::config::CacheConfig;
use super::lock::acquire;

pub(crate) const METRIC_CACHE_HIT: &str = "hyperjson_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "hyperjson_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "hyperjson_cache_evict_total";

/// A cached resource: its canonical href, decoded body and parsed links.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub href: String,
    pub body: Document,
    pub links: LinkMap,
}

impl Resource {
    pub fn new(href: impl Into<String>, body: Document, links: LinkMap) -> Self {
        Self {
            href: href.into(),
            body,
            links,
        }
    }
}

/// LRU map from href to [`Resource`].
pub struct ResourceCache {
    entries: Mutex<LruCache<String, Resource>>,
}

impl ResourceCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.max_size_non_zero())),
        }
    }

    /// Look up `href`, marking it most recently used.
    pub fn get(&self, href: &str) -> Option<Resource> {
        let found = acquire(&self.entries, "cache.get").get(href).cloned();
        if found.is_some() {
            counter!(METRIC_CACHE_HIT).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS).increment(1);
        }
        found
    }

    /// Membership check that leaves recency untouched.
    pub fn contains(&self, href: &str) -> bool {
        acquire(&self.entries, "cache.contains").contains(href)
    }

    /// Insert or replace a resource; returns the href evicted to make room.
    pub fn set(&self, resource: Resource) -> Option<String> {
        let href = resource.href.clone();
        let displaced = acquire(&self.entries, "cache.set").push(href.clone(), resource);

        match displaced {
            Some((evicted, _)) if evicted != href => {
                counter!(METRIC_CACHE_EVICT).increment(1);
                debug!(href = %href, evicted = %evicted, "evicted least recently used resource");
                Some(evicted)
            }
            _ => None,
        }
    }

    pub fn delete(&self, href: &str) -> Option<Resource> {
        acquire(&self.entries, "cache.delete").pop(href)
    }

    pub fn len(&self) -> usize {
        acquire(&self.entries, "cache.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        acquire(&self.entries, "cache.capacity").cap().get()
    }
}
