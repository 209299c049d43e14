//! TTL-bounded, capacity-capped price cache, keyed by store + normalized
//! ingredient term.
//!
//! Eviction is insertion-order (oldest inserted dropped first), not LRU;
//! entries are idempotent re-derivations of upstream facts, so writes are
//! last-writer-wins with no transactional guarantee. Optionally persisted to
//! a JSON file on every write and rehydrated at startup.

use super::resolver::PricedProduct;
use crate::normalization::term::normalize_term;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A fresh entry exists; `None` means "looked up before, no match".
    Hit(Option<PricedProduct>),
    Miss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    product: Option<PricedProduct>,
    stored_at_ms: i64,
}

pub struct PriceCache {
    ttl: Duration,
    max_entries: usize,
    persist_path: Option<PathBuf>,
    entries: Mutex<IndexMap<String, CacheEntry>>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl PriceCache {
    pub fn new(ttl: Duration, max_entries: usize, persist_path: Option<PathBuf>) -> Self {
        let cache = Self {
            ttl,
            max_entries: max_entries.max(1),
            persist_path,
            entries: Mutex::new(IndexMap::new()),
        };
        cache.rehydrate();
        cache
    }

    fn key(store: Option<&str>, term: &str) -> String {
        format!("{}|{}", store.unwrap_or("none"), normalize_term(term))
    }

    pub fn lookup(&self, store: Option<&str>, term: &str) -> CacheLookup {
        self.lookup_at(store, term, now_ms())
    }

    fn lookup_at(&self, store: Option<&str>, term: &str, now: i64) -> CacheLookup {
        let key = Self::key(store, term);
        let entries = self.entries.lock().expect("price cache poisoned");
        match entries.get(&key) {
            Some(e) if now - e.stored_at_ms < self.ttl.as_millis() as i64 => {
                CacheLookup::Hit(e.product.clone())
            }
            // Stale entries are treated as absent; they stay eligible for
            // eviction and overwrite.
            _ => CacheLookup::Miss,
        }
    }

    pub fn store(&self, store: Option<&str>, term: &str, product: Option<PricedProduct>) {
        self.store_at(store, term, product, now_ms());
        self.persist();
    }

    fn store_at(&self, store: Option<&str>, term: &str, product: Option<PricedProduct>, now: i64) {
        let key = Self::key(store, term);
        let mut entries = self.entries.lock().expect("price cache poisoned");
        // Evict oldest-inserted entries until the new insert fits the cap.
        while !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.shift_remove_index(0);
        }
        entries.insert(
            key,
            CacheEntry {
                product,
                stored_at_ms: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load persisted entries, dropping anything already past TTL. Missing or
    /// malformed files are a cold start, not an error.
    fn rehydrate(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        let parsed: IndexMap<String, CacheEntry> = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable price cache file");
                return;
            }
        };
        let now = now_ms();
        let ttl_ms = self.ttl.as_millis() as i64;
        let mut entries = self.entries.lock().expect("price cache poisoned");
        for (k, v) in parsed {
            if now - v.stored_at_ms < ttl_ms {
                entries.insert(k, v);
            }
        }
        debug!(entries = entries.len(), "price cache rehydrated");
    }

    /// Best-effort write-through; persistence failures only warn.
    fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let snapshot = {
            let entries = self.entries.lock().expect("price cache poisoned");
            serde_json::to_string(&*entries)
        };
        match snapshot {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!(path = %path.display(), error = %e, "failed to persist price cache");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize price cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str) -> PricedProduct {
        PricedProduct {
            product_id: id.to_string(),
            description: "test".into(),
            brand: "Test".into(),
            price: 1.0,
            regular_price: 1.0,
            on_sale: false,
            size: "1 ea".into(),
            image_url: None,
            upc: id.to_string(),
            aisle: None,
            categories: vec![],
        }
    }

    #[test]
    fn hit_within_ttl_and_normalized_key() {
        let cache = PriceCache::new(Duration::from_secs(900), 500, None);
        cache.store(Some("S1"), "Whole Milk", Some(product("1")));
        match cache.lookup(Some("S1"), "whole   milk!") {
            CacheLookup::Hit(Some(p)) => assert_eq!(p.product_id, "1"),
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(cache.lookup(Some("S2"), "whole milk"), CacheLookup::Miss);
    }

    #[test]
    fn negative_results_are_cached_too() {
        let cache = PriceCache::new(Duration::from_secs(900), 500, None);
        cache.store(None, "unobtainium", None);
        assert_eq!(cache.lookup(None, "unobtainium"), CacheLookup::Hit(None));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = PriceCache::new(Duration::from_secs(900), 500, None);
        let t0 = 1_000_000i64;
        cache.store_at(Some("S1"), "milk", Some(product("1")), t0);
        let fifteen_min = 15 * 60 * 1000;
        assert_eq!(
            cache.lookup_at(Some("S1"), "milk", t0 + fifteen_min - 1),
            CacheLookup::Hit(Some(product("1")))
        );
        assert_eq!(
            cache.lookup_at(Some("S1"), "milk", t0 + fifteen_min),
            CacheLookup::Miss
        );
    }

    #[test]
    fn capacity_evicts_oldest_inserted_first() {
        let cache = PriceCache::new(Duration::from_secs(900), 3, None);
        for (i, term) in ["milk", "eggs", "bread"].iter().enumerate() {
            cache.store(None, term, Some(product(&i.to_string())));
        }
        cache.store(None, "butter", Some(product("3")));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.lookup(None, "milk"), CacheLookup::Miss);
        assert!(matches!(cache.lookup(None, "eggs"), CacheLookup::Hit(_)));
        assert!(matches!(cache.lookup(None, "butter"), CacheLookup::Hit(_)));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = PriceCache::new(Duration::from_secs(900), 2, None);
        cache.store(None, "milk", Some(product("1")));
        cache.store(None, "eggs", Some(product("2")));
        cache.store(None, "milk", Some(product("9")));
        assert_eq!(cache.len(), 2);
        match cache.lookup(None, "milk") {
            CacheLookup::Hit(Some(p)) => assert_eq!(p.product_id, "9"),
            other => panic!("expected updated hit, got {other:?}"),
        }
    }

    #[test]
    fn size_never_exceeds_cap() {
        let cache = PriceCache::new(Duration::from_secs(900), 500, None);
        for i in 0..501 {
            cache.store(None, &format!("item number {i}"), Some(product(&i.to_string())));
            assert!(cache.len() <= 500);
        }
        assert_eq!(cache.len(), 500);
        assert_eq!(cache.lookup(None, "item number 0"), CacheLookup::Miss);
    }

    #[test]
    fn persists_and_rehydrates_dropping_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price_cache.json");

        let cache = PriceCache::new(Duration::from_secs(900), 500, Some(path.clone()));
        cache.store(Some("S1"), "milk", Some(product("1")));
        // A stale entry written directly with an old timestamp, then
        // persisted alongside the fresh one.
        cache.store_at(Some("S1"), "eggs", Some(product("2")), now_ms() - 16 * 60 * 1000);
        cache.persist();

        let reloaded = PriceCache::new(Duration::from_secs(900), 500, Some(path));
        assert!(matches!(
            reloaded.lookup(Some("S1"), "milk"),
            CacheLookup::Hit(Some(_))
        ));
        assert_eq!(reloaded.lookup(Some("S1"), "eggs"), CacheLookup::Miss);
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn missing_persist_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(
            Duration::from_secs(900),
            500,
            Some(dir.path().join("nope.json")),
        );
        assert!(cache.is_empty());
    }
}
