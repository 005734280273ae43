//! # Chairside
//!
//! Clinic Record Intelligence - An in-memory multi-dimensional indexing and
//! caching engine for clinic management records.
//!
//! ## Features
//!
//! - **Multi-dimensional indexes**: one pass over the records builds
//!   temporal buckets (day through semester), categorical groupings,
//!   composites, and an n-gram text index with Arabic-aware tokenization
//! - **Declarative filtering**: conjunction of category, paid-status,
//!   date/amount (preset or explicit range) and multi-word search, with
//!   stable sorts and pagination
//! - **Memory-bounded caching**: byte-estimated accounting, TTL plus
//!   LRU/size/FIFO eviction, eviction hooks, named cleanup timers
//! - **Per-domain adapters**: expense, revenue, and patient views that
//!   invalidate on source change events, coalesce concurrent recomputes,
//!   and preload adjacent periods
//!
//! ## Modules
//!
//! - [`records`]: record types, the source contract, and change events
//! - [`index`]: the multi-dimensional indexing engine
//! - [`query`]: filter engine, pagination, statistics
//! - [`cache`]: cache manager, stores, request coalescing
//! - [`adapters`]: per-domain cached views
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chairside::adapters::{AdapterConfig, ExpenseAdapter};
//! use chairside::cache::CacheManager;
//! use chairside::records::{Expense, MemorySource, RecordSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(MemorySource::with_records(vec![
//!         Expense::new(1, "2024-03-05").category("supplies").amount(250.0).paid(true),
//!         Expense::new(2, "2024-03-12").category("lab").amount(1200.0).paid(false),
//!     ]));
//!
//!     let manager = Arc::new(CacheManager::default());
//!     let adapter = ExpenseAdapter::new(
//!         Arc::clone(&source) as Arc<dyn RecordSource<Expense>>,
//!         Arc::clone(&manager),
//!         AdapterConfig::expense_defaults(),
//!     );
//!     adapter.start();
//!
//!     let summary = adapter.monthly_summary("2024-03").await;
//!     println!("March: {} expenses totaling {}", summary.count, summary.total);
//!
//!     // Mutations invalidate the caches through the change stream
//!     source.insert(Expense::new(3, "2024-03-20").amount(80.0)).await;
//!
//!     adapter.shutdown();
//!     manager.stop_all_cleanup_timers();
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod index;
pub mod query;
pub mod records;

// Re-export top-level types for convenience
pub use records::{
    ChangeKind, Expense, Indexable, MemorySource, Payment, RecordChange, RecordSource,
    SourceError, SourceResult,
};

pub use index::{
    AmountBand, BuildStats, IndexDimension, IndexEngine, PaidStatus, SearchOptions,
};

pub use query::{
    AmountFilter, AmountPreset, DateFilter, DatePreset, FilterEngine, FilterStats, Page,
    RecordFilter, SortBy, SortOrder,
};

pub use cache::{
    CacheManager, CacheStore, CleanupConfig, CleanupPriority, MemoryLevel, MemoryLimits,
    MemoryStats, Singleflight,
};

pub use adapters::{
    AdapterConfig, CategoryTotals, DailyRevenue, ExpenseAdapter, MonthlyRevenue, MonthlySummary,
    PatientAdapter, PatientSummary, RevenueAdapter,
};

pub use config::{Config, ConfigError, LoggingConfig};
