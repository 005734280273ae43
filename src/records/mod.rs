//! Chairside Record Layer
//!
//! Records and the contract with whatever owns them:
//!
//! - **Types**: the `Indexable` trait plus the concrete `Expense` and
//!   `Payment` records, and the change events a source emits
//! - **Source**: the `RecordSource` contract and a reference in-memory
//!   implementation with CRUD and change broadcasting
//! - **Delivery**: stateless classify-by-date-delta helpers for lab
//!   delivery tracking (no index state, pure functions)
//!
//! The indexing layers never own records; they read snapshots from a
//! source and rebuild wholesale when notified of a change.

mod delivery;
mod source;
mod types;

pub use delivery::{
    classify_delivery, classify_requests, filter_requests, ClassifiedRequest, DeliveryKind,
    DeliveryRequest, DeliveryStatus,
};
pub use source::{MemorySource, RecordSource, SourceError, SourceResult, TogglePaid};
pub use types::{
    expense_search_text, payment_search_text, ChangeKind, Expense, Indexable, Payment,
    RecordChange,
};
