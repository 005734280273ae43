//! Record sources
//!
//! The indexing core never owns the canonical record collection; it reads
//! snapshots from a [`RecordSource`] and learns about mutations through a
//! broadcast channel of [`RecordChange`] events. `MemorySource` is the
//! reference implementation used by the adapters' tests and the CLI.

use crate::records::types::{ChangeKind, Indexable, RecordChange};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Errors a record source can report
#[derive(Debug, Error)]
pub enum SourceError {
    /// No record with the given id exists
    #[error("Record not found: {0}")]
    NotFound(u64),

    /// The backing store is unreachable or failed
    #[error("Record source unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for record source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Contract between the indexing core and whatever owns the records
///
/// Implementations own the canonical mutable collection; the core only ever
/// reads snapshots and subscribes to change events to know when its derived
/// state is stale.
#[async_trait]
pub trait RecordSource<R: Indexable>: Send + Sync {
    /// Fetch a snapshot of every record.
    async fn fetch_all(&self) -> SourceResult<Vec<R>>;

    /// Fetch the records matching the given ids. Unknown ids are skipped,
    /// not errors.
    async fn fetch_by_ids(&self, ids: &[u64]) -> SourceResult<Vec<R>>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<RecordChange>;
}

/// A record whose payment status can be flipped in place
pub trait TogglePaid {
    /// Flip the paid flag, returning the new value. An unset flag counts
    /// as unpaid before the toggle.
    fn toggle_paid(&mut self) -> bool;
}

impl TogglePaid for crate::records::types::Expense {
    fn toggle_paid(&mut self) -> bool {
        let next = !self.is_paid.unwrap_or(false);
        self.is_paid = Some(next);
        next
    }
}

impl TogglePaid for crate::records::types::Payment {
    fn toggle_paid(&mut self) -> bool {
        let next = !self.is_paid.unwrap_or(false);
        self.is_paid = Some(next);
        next
    }
}

/// In-memory record source with CRUD operations and change events
///
/// Holds the canonical collection behind an async `RwLock` and broadcasts a
/// typed [`RecordChange`] for every mutation. Subscribers that lag simply
/// miss events; adapters treat any event as "clear everything", so a missed
/// event only delays invalidation until the next one.
pub struct MemorySource<R: Indexable> {
    records: RwLock<Vec<R>>,
    changes: broadcast::Sender<RecordChange>,
}

impl<R: Indexable> MemorySource<R> {
    /// Create an empty source
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            records: RwLock::new(Vec::new()),
            changes,
        }
    }

    /// Create a source seeded with records
    pub fn with_records(records: Vec<R>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            records: RwLock::new(records),
            changes,
        }
    }

    /// Number of records currently held
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the source holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Insert a record and notify subscribers
    pub async fn insert(&self, record: R) {
        let id = record.id();
        self.records.write().await.push(record);
        self.emit(RecordChange::new(ChangeKind::Added, id));
    }

    /// Replace the record with the same id and notify subscribers
    pub async fn update(&self, record: R) -> SourceResult<()> {
        let id = record.id();
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(SourceError::NotFound(id))?;
        *slot = record;
        drop(records);
        self.emit(RecordChange::new(ChangeKind::Updated, id));
        Ok(())
    }

    /// Remove a record by id, returning it
    pub async fn remove(&self, id: u64) -> SourceResult<R> {
        let mut records = self.records.write().await;
        let pos = records
            .iter()
            .position(|r| r.id() == id)
            .ok_or(SourceError::NotFound(id))?;
        let removed = records.remove(pos);
        drop(records);
        self.emit(RecordChange::new(ChangeKind::Deleted, id));
        Ok(removed)
    }

    /// Swap in a whole new collection (bulk import, reload)
    pub async fn replace_all(&self, records: Vec<R>) {
        *self.records.write().await = records;
        self.emit(RecordChange::bulk(ChangeKind::Updated));
    }

    fn emit(&self, change: RecordChange) {
        // No subscribers is fine; events are advisory
        let _ = self.changes.send(change);
    }
}

impl<R: Indexable + TogglePaid> MemorySource<R> {
    /// Flip a record's paid flag and notify subscribers
    pub async fn toggle_paid(&self, id: u64) -> SourceResult<bool> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(SourceError::NotFound(id))?;
        let next = slot.toggle_paid();
        drop(records);
        self.emit(RecordChange::new(ChangeKind::PaymentToggled, id));
        Ok(next)
    }
}

impl<R: Indexable> Default for MemorySource<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Indexable> RecordSource<R> for MemorySource<R> {
    async fn fetch_all(&self) -> SourceResult<Vec<R>> {
        Ok(self.records.read().await.clone())
    }

    async fn fetch_by_ids(&self, ids: &[u64]) -> SourceResult<Vec<R>> {
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| wanted.contains(&r.id()))
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}
