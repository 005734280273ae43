//! Per-domain cache adapters
//!
//! Each adapter glues one record source to one filter engine and a set of
//! named cache stores, all sharing a process-wide `CacheManager`:
//!
//! ```text
//! RecordSource --change events--> adapter watcher -> invalidate
//!       |                                               |
//!       fetch_all (lazy, on first read after invalidation)
//!       v                                               v
//! FilterEngine <- getters -> CacheStore(s) <-> CacheManager
//! ```
//!
//! All adapters follow the same shape: subscription-driven invalidation
//! instead of TTL checks on every read, per-key coalescing of concurrent
//! recomputes, progressive getter variants that report staged progress
//! without changing results, and delayed preloading of adjacent periods
//! deduplicated by an already-preloaded set. Source failures never
//! propagate out of a getter; they degrade to empty results with the
//! error retained on the adapter.

pub mod expense;
pub mod patient;
pub mod revenue;

pub use expense::{CategoryTotal, CategoryTotals, ExpenseAdapter, MonthlySummary};
pub use patient::{PatientAdapter, PatientSummary};
pub use revenue::{DailyRevenue, MonthlyRevenue, RevenueAdapter};

use chrono::Duration;
use serde::Serialize;
use std::future::Future;

use crate::cache::{CacheStore, CleanupConfig, CleanupPriority, Singleflight};

/// Cache sizing and preload timing for one adapter
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Eviction settings applied to every store this adapter owns
    pub cleanup: CleanupConfig,
    /// How long preloading waits before warming adjacent periods
    pub preload_delay: std::time::Duration,
}

impl AdapterConfig {
    /// Expense defaults: 60s entry lifetime
    pub fn expense_defaults() -> Self {
        Self {
            cleanup: CleanupConfig {
                max_items: 50,
                max_age: Duration::seconds(60),
                priority: CleanupPriority::Lru,
            },
            preload_delay: std::time::Duration::from_millis(500),
        }
    }

    /// Revenue defaults: 30s entry lifetime
    pub fn revenue_defaults() -> Self {
        Self {
            cleanup: CleanupConfig {
                max_items: 50,
                max_age: Duration::seconds(30),
                priority: CleanupPriority::Lru,
            },
            preload_delay: std::time::Duration::from_millis(500),
        }
    }

    /// Patient defaults: 5min entry lifetime, smaller ceiling
    pub fn patient_defaults() -> Self {
        Self {
            cleanup: CleanupConfig {
                max_items: 30,
                max_age: Duration::seconds(300),
                priority: CleanupPriority::Lru,
            },
            preload_delay: std::time::Duration::from_millis(500),
        }
    }
}

/// Serve from the store or compute once, coalescing concurrent misses
pub(crate) async fn cached<V, F, Fut>(
    store: &CacheStore<V>,
    flight: &Singleflight<V>,
    key: &str,
    compute: F,
) -> V
where
    V: Clone + Serialize + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = V>,
{
    if let Some(hit) = store.get(key) {
        return hit;
    }
    flight
        .run(key, || async {
            let value = compute().await;
            store.insert(key, value.clone());
            value
        })
        .await
}
