//! Chairside Index Structures
//!
//! Multi-dimensional in-memory indexes over a snapshot of records:
//!
//! - **TemporalIndex**: day/month/year/week/quarter/semester buckets
//! - **CategoricalIndex**: category, payment status, amount bands, and
//!   two-key composite buckets (date x category, patient x month, ...)
//! - **TextIndex**: word and phrase inverted indexes with fuzzy lookup
//! - **IndexEngine**: one-pass build feeding all of the above, plus
//!   search and direct bucket lookups
//!
//! # Architecture
//!
//! ```text
//! build(records):
//!     snapshot records into Vec<R>
//!        ↓ one pass
//!     by_id, temporal buckets, categorical buckets, text indexes
//!        ↓
//!     precomputed sorts (by amount, by date) + build stats
//! ```
//!
//! Every bucket holds positions into the snapshot, not record clones, so
//! a record appearing in six temporal buckets costs six `usize`s. All
//! structures are rebuilt wholesale by `update_data`; nothing is mutated
//! incrementally. Lookups with unknown keys return empty collections,
//! never errors.

mod categorical;
mod engine;
mod temporal;
mod text;

pub use categorical::{AmountBand, CategoricalIndex, PaidStatus};
pub use engine::{BuildStats, IndexEngine, SearchOptions};
pub use temporal::{parse_record_date, BucketKeys, TemporalIndex};
pub use text::{tokenize, TextIndex};

use serde::{Deserialize, Serialize};

/// A single-key index dimension addressable by name
///
/// Used by `IndexEngine::get_by_index` to dispatch a direct bucket lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDimension {
    /// Day buckets, keyed `YYYY-MM-DD`
    Date,
    /// Month buckets, keyed `YYYY-MM`
    Month,
    /// Year buckets, keyed `YYYY`
    Year,
    /// ISO week buckets, keyed `YYYY-Www`
    Week,
    /// Quarter buckets, keyed `YYYY-Qn`
    Quarter,
    /// Semester buckets, keyed `YYYY-Sn`
    Semester,
    /// Category buckets, keyed by the raw category label
    Category,
    /// Payment status buckets, keyed `paid` / `unpaid`
    Status,
    /// Amount band buckets, keyed by the band label (e.g. `1000-5000`)
    AmountBand,
}

impl IndexDimension {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "date" | "day" => Some(Self::Date),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            "week" => Some(Self::Week),
            "quarter" => Some(Self::Quarter),
            "semester" => Some(Self::Semester),
            "category" => Some(Self::Category),
            "status" => Some(Self::Status),
            "amount" | "amountband" | "band" => Some(Self::AmountBand),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date => write!(f, "date"),
            Self::Month => write!(f, "month"),
            Self::Year => write!(f, "year"),
            Self::Week => write!(f, "week"),
            Self::Quarter => write!(f, "quarter"),
            Self::Semester => write!(f, "semester"),
            Self::Category => write!(f, "category"),
            Self::Status => write!(f, "status"),
            Self::AmountBand => write!(f, "amountband"),
        }
    }
}
