//! Cache Manager - process-wide memory accounting and eviction
//!
//! One explicitly constructed manager instance is shared by every cache
//! store in the process. It tracks metadata only: per-key estimated byte
//! size (serialized-JSON length), last access time, and insertion
//! sequence. The values themselves live in the owning stores; eviction
//! reaches them through registered hooks held as weak references, so a
//! dropped store never leaks a hook.
//!
//! Eviction runs in two phases against one store's key set:
//! 1. age: every key whose last access is older than `max_age` goes
//! 2. size: if the survivors still exceed `max_items`, the excess goes in
//!    priority order (`lru`: oldest access first, `size`: largest first,
//!    `fifo`: earliest insertion first)
//!
//! The global sweep (`global_cleanup`) walks every registered key
//! regardless of owner, drops entries past the long TTL, and fires the
//! matching eviction hooks so backing stores free the values too. Named
//! periodic timers are tracked so rescheduling under the same name always
//! aborts the previous one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lock;

/// Callback removing one evicted key's value from its backing store
pub type EvictionHook = dyn Fn(&str) + Send + Sync;

/// Eviction order used when a store exceeds its item ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPriority {
    /// Oldest last-access first
    #[default]
    Lru,
    /// Largest estimated size first
    Size,
    /// Earliest insertion first
    Fifo,
}

impl CleanupPriority {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lru" => Some(Self::Lru),
            "size" => Some(Self::Size),
            "fifo" => Some(Self::Fifo),
            _ => None,
        }
    }
}

impl std::fmt::Display for CleanupPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lru => "lru",
            Self::Size => "size",
            Self::Fifo => "fifo",
        };
        write!(f, "{name}")
    }
}

/// Per-store eviction settings
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Item ceiling enforced by the size phase
    pub max_items: usize,
    /// Age ceiling enforced by the TTL phase
    pub max_age: Duration,
    /// Order the size phase evicts in
    pub priority: CleanupPriority,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_age: Duration::minutes(5),
            priority: CleanupPriority::Lru,
        }
    }
}

/// Process-wide memory ceilings
#[derive(Debug, Clone)]
pub struct MemoryLimits {
    /// Hard ceiling for all tracked bytes
    pub max_total_bytes: usize,
    /// Threshold for the medium warning level
    pub warning_bytes: usize,
    /// Age past which the global sweep drops an entry
    pub long_ttl: Duration,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 50 * 1024 * 1024,
            warning_bytes: 40 * 1024 * 1024,
            long_ttl: Duration::minutes(10),
        }
    }
}

/// Pressure level derived from tracked bytes versus the limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{name}")
    }
}

/// Tracked bytes and entries for one key category
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryStats {
    pub bytes: usize,
    pub items: usize,
}

/// Aggregate memory statistics across every registered key
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_bytes: usize,
    pub total_mb: f64,
    pub item_count: usize,
    /// Grouped by the key prefix before the first `-`
    pub by_category: BTreeMap<String, CategoryStats>,
    pub level: MemoryLevel,
    pub is_over_limit: bool,
}

impl std::fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} MB across {} entries in {} categories (level {})",
            self.total_mb,
            self.item_count,
            self.by_category.len(),
            self.level
        )
    }
}

/// Before/after accounting for one global sweep
#[derive(Debug, Clone, Serialize)]
pub struct GlobalCleanupReport {
    pub evicted: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

#[derive(Debug, Clone)]
struct EntryMeta {
    bytes: usize,
    last_access: DateTime<Utc>,
    inserted_seq: u64,
}

/// Shared metadata registry, eviction planner, and timer owner
pub struct CacheManager {
    registry: Mutex<HashMap<String, EntryMeta>>,
    hooks: Mutex<Vec<(String, Weak<EvictionHook>)>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    limits: MemoryLimits,
    insert_seq: AtomicU64,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("tracked", &lock(&self.registry).len())
            .field("limits", &self.limits)
            .finish()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(MemoryLimits::default())
    }
}

impl CacheManager {
    /// Create a manager with explicit memory limits
    pub fn new(limits: MemoryLimits) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            hooks: Mutex::new(Vec::new()),
            timers: Mutex::new(HashMap::new()),
            limits,
            insert_seq: AtomicU64::new(0),
        }
    }

    /// The configured memory limits
    pub fn limits(&self) -> &MemoryLimits {
        &self.limits
    }

    /// Serialized-JSON UTF-8 length of a value, the size estimate used
    /// for all accounting
    pub fn estimate_size<V: Serialize>(value: &V) -> usize {
        serde_json::to_string(value).map(|json| json.len()).unwrap_or(0)
    }

    /// Track a key's size and refresh its access time
    pub fn record_usage<V: Serialize>(&self, key: &str, value: &V) {
        self.record_usage_at(key, value, Utc::now());
    }

    /// Tracking variant with an explicit clock
    pub fn record_usage_at<V: Serialize>(&self, key: &str, value: &V, now: DateTime<Utc>) {
        let bytes = Self::estimate_size(value);
        let mut registry = lock(&self.registry);
        match registry.get_mut(key) {
            // An overwrite keeps its original insertion position
            Some(meta) => {
                meta.bytes = bytes;
                meta.last_access = now;
            }
            None => {
                let inserted_seq = self.insert_seq.fetch_add(1, Ordering::Relaxed);
                registry.insert(
                    key.to_string(),
                    EntryMeta {
                        bytes,
                        last_access: now,
                        inserted_seq,
                    },
                );
            }
        }
    }

    /// Refresh a key's access time on a cache read
    pub fn touch(&self, key: &str) {
        self.touch_at(key, Utc::now());
    }

    /// Refresh variant with an explicit clock
    pub fn touch_at(&self, key: &str, now: DateTime<Utc>) {
        if let Some(meta) = lock(&self.registry).get_mut(key) {
            meta.last_access = now;
        }
    }

    /// Drop a key's metadata; the caller drops the value from its own map
    pub fn remove(&self, key: &str) {
        lock(&self.registry).remove(key);
    }

    /// Whether a key is currently tracked
    pub fn is_tracked(&self, key: &str) -> bool {
        lock(&self.registry).contains_key(key)
    }

    /// Sum of all tracked entry sizes
    pub fn tracked_bytes(&self) -> usize {
        lock(&self.registry).values().map(|meta| meta.bytes).sum()
    }

    /// Aggregate statistics grouped by key category
    pub fn memory_stats(&self) -> MemoryStats {
        let registry = lock(&self.registry);
        let mut by_category: BTreeMap<String, CategoryStats> = BTreeMap::new();
        let mut total_bytes = 0usize;
        for (key, meta) in registry.iter() {
            let entry = by_category.entry(category_of(key).to_string()).or_default();
            entry.bytes += meta.bytes;
            entry.items += 1;
            total_bytes += meta.bytes;
        }

        let level = if total_bytes as f64 > self.limits.max_total_bytes as f64 * 0.9 {
            MemoryLevel::High
        } else if total_bytes > self.limits.warning_bytes {
            MemoryLevel::Medium
        } else {
            MemoryLevel::Low
        };

        MemoryStats {
            total_bytes,
            total_mb: total_bytes as f64 / (1024.0 * 1024.0),
            item_count: registry.len(),
            by_category,
            level,
            is_over_limit: total_bytes > self.limits.max_total_bytes,
        }
    }

    /// Register an eviction hook for keys in one category
    ///
    /// The hook is held weakly; once the owning store drops its strong
    /// reference the hook is pruned on the next sweep.
    pub fn register_eviction_hook(&self, category: impl Into<String>, hook: Weak<EvictionHook>) {
        lock(&self.hooks).push((category.into(), hook));
    }

    /// Two-phase eviction over one store's key set
    ///
    /// Returns the keys to evict and drops their metadata; the calling
    /// store removes the values. Keys the registry has never seen are
    /// evicted outright to restore the entry invariant.
    pub fn cleanup_keys(
        &self,
        keys: &[String],
        config: &CleanupConfig,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut registry = lock(&self.registry);
        let mut evicted: Vec<String> = Vec::new();
        let mut survivors: Vec<(String, EntryMeta)> = Vec::new();

        for key in keys {
            match registry.get(key) {
                Some(meta) if now - meta.last_access > config.max_age => {
                    evicted.push(key.clone())
                }
                Some(meta) => survivors.push((key.clone(), meta.clone())),
                None => {
                    warn!(key = key.as_str(), "cache key missing from registry, evicting");
                    evicted.push(key.clone());
                }
            }
        }

        if survivors.len() > config.max_items {
            match config.priority {
                CleanupPriority::Lru => {
                    survivors.sort_by_key(|(_, meta)| meta.last_access);
                }
                CleanupPriority::Size => {
                    survivors.sort_by(|a, b| b.1.bytes.cmp(&a.1.bytes));
                }
                CleanupPriority::Fifo => {
                    survivors.sort_by_key(|(_, meta)| meta.inserted_seq);
                }
            }
            let excess = survivors.len() - config.max_items;
            evicted.extend(survivors.drain(..excess).map(|(key, _)| key));
        }

        for key in &evicted {
            registry.remove(key);
        }
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), priority = %config.priority, "cache cleanup");
        }
        evicted
    }

    /// Sweep every registered key past the long TTL, firing eviction
    /// hooks so backing stores drop the values as well
    pub fn global_cleanup(&self) -> GlobalCleanupReport {
        self.global_cleanup_at(Utc::now())
    }

    /// Sweeping variant with an explicit clock
    pub fn global_cleanup_at(&self, now: DateTime<Utc>) -> GlobalCleanupReport {
        let (expired, bytes_before, bytes_after) = {
            let mut registry = lock(&self.registry);
            let bytes_before: usize = registry.values().map(|meta| meta.bytes).sum();
            let expired: Vec<String> = registry
                .iter()
                .filter(|(_, meta)| now - meta.last_access > self.limits.long_ttl)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                registry.remove(key);
            }
            let bytes_after: usize = registry.values().map(|meta| meta.bytes).sum();
            (expired, bytes_before, bytes_after)
        };

        // Fire hooks outside the registry lock; prune dead ones
        let mut hooks = lock(&self.hooks);
        hooks.retain(|(_, hook)| hook.strong_count() > 0);
        for key in &expired {
            let category = category_of(key);
            for (prefix, hook) in hooks.iter() {
                if prefix == category {
                    if let Some(hook) = hook.upgrade() {
                        hook(key);
                    }
                }
            }
        }

        if !expired.is_empty() {
            info!(evicted = expired.len(), "global cache sweep");
        }
        let stats = self.memory_stats();
        if stats.level != MemoryLevel::Low {
            warn!(%stats, "cache memory pressure");
        }
        GlobalCleanupReport {
            evicted: expired.len(),
            bytes_before,
            bytes_after,
        }
    }

    /// Run `task` every `every`, replacing any timer with the same name
    pub fn schedule_periodic_cleanup(
        &self,
        name: impl Into<String>,
        every: std::time::Duration,
        task: impl Fn() + Send + Sync + 'static,
    ) {
        let name = name.into();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // Skip the first immediate tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                task();
            }
        });

        let mut timers = lock(&self.timers);
        if let Some(previous) = timers.insert(name.clone(), handle) {
            previous.abort();
            debug!(timer = name.as_str(), "replaced periodic cleanup timer");
        }
    }

    /// Abort one named timer
    pub fn stop_cleanup_timer(&self, name: &str) {
        if let Some(handle) = lock(&self.timers).remove(name) {
            handle.abort();
        }
    }

    /// Abort every registered timer
    pub fn stop_all_cleanup_timers(&self) {
        let mut timers = lock(&self.timers);
        for (name, handle) in timers.drain() {
            handle.abort();
            debug!(timer = name.as_str(), "stopped cleanup timer");
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.stop_all_cleanup_timers();
    }
}

/// Key prefix before the first `-`, the grouping unit for stats and hooks
fn category_of(key: &str) -> &str {
    key.split('-').next().unwrap_or(key)
}
