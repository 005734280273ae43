//! Cache layer - memory-accounted stores over a shared manager
//!
//! Three pieces:
//! - `manager`: process-wide metadata registry, eviction planning, global
//!   sweep, and named periodic timers
//! - `store`: a named value map whose every entry is mirrored in the
//!   manager's registry, with eviction wired back through a weak hook
//! - `flight`: per-key coalescing of concurrent identical computations
//!
//! ```text
//! adapter getter -> CacheStore.get  -> hit:  touch + clone
//!                                  \-> miss: Singleflight.run(compute)
//!                                            -> CacheStore.insert
//!                                            -> CacheManager.record_usage
//!                                            -> cleanup when over ceiling
//! ```

pub mod flight;
pub mod manager;
pub mod store;

pub use flight::Singleflight;
pub use manager::{
    CacheManager, CategoryStats, CleanupConfig, CleanupPriority, EvictionHook,
    GlobalCleanupReport, MemoryLevel, MemoryLimits, MemoryStats,
};
pub use store::CacheStore;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the inner data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
