//! Cache Store - a named value map mirrored in the manager's registry
//!
//! Keys are namespaced as `{name}-{key}` toward the manager, so the store
//! name doubles as the stats/hook category (names must not contain `-`).
//! Every mutation keeps the map and the manager's metadata in step:
//! inserting records usage, reading refreshes the access time, removing
//! drops both sides. A weak eviction hook registered at construction lets
//! the manager's global sweep clear the backing values too, and inserting
//! past the item ceiling triggers an immediate cleanup pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::manager::{CacheManager, CleanupConfig, EvictionHook};
use super::lock;

/// One named cache map bound to a shared `CacheManager`
pub struct CacheStore<V> {
    name: String,
    map: Arc<Mutex<HashMap<String, V>>>,
    manager: Arc<CacheManager>,
    config: CleanupConfig,
    // Keeps the weak hook registered with the manager alive
    _hook: Arc<EvictionHook>,
}

impl<V> std::fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("name", &self.name)
            .field("entries", &lock(&self.map).len())
            .finish()
    }
}

impl<V: Clone + Serialize + Send + 'static> CacheStore<V> {
    /// Create a store and register its eviction hook with the manager
    pub fn new(
        name: impl Into<String>,
        manager: Arc<CacheManager>,
        config: CleanupConfig,
    ) -> Self {
        let name = name.into();
        let map: Arc<Mutex<HashMap<String, V>>> = Arc::new(Mutex::new(HashMap::new()));

        let hook_map = Arc::clone(&map);
        let prefix = format!("{name}-");
        let hook: Arc<EvictionHook> = Arc::new(move |full_key: &str| {
            if let Some(short) = full_key.strip_prefix(prefix.as_str()) {
                lock(&hook_map).remove(short);
            }
        });
        manager.register_eviction_hook(name.clone(), Arc::downgrade(&hook));

        Self {
            name,
            map,
            manager,
            config,
            _hook: hook,
        }
    }

    /// The store's name, also its manager-side category
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a value, record its usage, and clean up if over the ceiling
    pub fn insert(&self, key: &str, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    /// Inserting variant with an explicit clock
    pub fn insert_at(&self, key: &str, value: V, now: DateTime<Utc>) {
        self.manager.record_usage_at(&self.full_key(key), &value, now);
        let len = {
            let mut map = lock(&self.map);
            map.insert(key.to_string(), value);
            map.len()
        };
        if len > self.config.max_items {
            self.cleanup_at(now);
        }
    }

    /// Fetch a value, refreshing its access time on a hit
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Fetching variant with an explicit clock
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let value = lock(&self.map).get(key).cloned();
        if value.is_some() {
            self.manager.touch_at(&self.full_key(key), now);
        }
        value
    }

    /// Whether a key is present, without touching it
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.map).contains_key(key)
    }

    /// Drop one entry from the map and the manager's registry
    pub fn remove(&self, key: &str) -> Option<V> {
        let value = lock(&self.map).remove(key);
        if value.is_some() {
            self.manager.remove(&self.full_key(key));
        }
        value
    }

    /// Drop every entry from the map and the manager's registry
    pub fn clear(&self) {
        let keys: Vec<String> = {
            let mut map = lock(&self.map);
            let keys = map.keys().cloned().collect();
            map.clear();
            keys
        };
        for key in keys {
            self.manager.remove(&self.full_key(&key));
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        lock(&self.map).len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        lock(&self.map).is_empty()
    }

    /// Current keys, unordered
    pub fn keys(&self) -> Vec<String> {
        lock(&self.map).keys().cloned().collect()
    }

    /// Run the two-phase eviction pass; returns how many entries went
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// Cleanup variant with an explicit clock
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let full_keys: Vec<String> = lock(&self.map)
            .keys()
            .map(|key| self.full_key(key))
            .collect();
        let evicted = self.manager.cleanup_keys(&full_keys, &self.config, now);

        let prefix = format!("{}-", self.name);
        let mut map = lock(&self.map);
        for full_key in &evicted {
            if let Some(short) = full_key.strip_prefix(prefix.as_str()) {
                map.remove(short);
            }
        }
        evicted.len()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}-{}", self.name, key)
    }
}
