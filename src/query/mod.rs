//! Query layer - typed filter criteria and the filtering facade
//!
//! - **Filters**: criteria sum types (date/amount preset or explicit
//!   bounds), sort selection, pagination
//! - **Engine**: `FilterEngine` applying a filter as a sequential
//!   AND-conjunction over an indexed snapshot
//!
//! Date and amount presets resolve against an explicit `today`, so query
//! behavior stays reproducible in tests and batch runs.
//!
//! # Examples
//!
//! ```rust,ignore
//! use chairside::query::{FilterEngine, RecordFilter, SortBy, SortOrder};
//!
//! let engine = FilterEngine::new(expenses, expense_search_text);
//!
//! let filter = RecordFilter::new()
//!     .category("supplies")
//!     .paid(false)
//!     .sort(SortBy::Amount, SortOrder::Desc);
//!
//! let page = engine.paginate_filters(&filter, 1, 20);
//! println!("{} of {} match", page.items.len(), page.total_items);
//! ```

pub mod engine;
pub mod filters;

pub use engine::{FilterEngine, FilterStats};
pub use filters::{
    AmountFilter, AmountPreset, DateFilter, DatePreset, Page, RecordFilter, SortBy, SortOrder,
};
