//! Patient Adapter - cached per-patient payment views
//!
//! Longer TTL than the other adapters: patient histories change rarely
//! compared to day/month aggregates, so the cache keeps them for minutes
//! rather than seconds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{lock, CacheManager, CacheStore, Singleflight};
use crate::query::FilterEngine;
use crate::records::{payment_search_text, Payment, RecordSource};

use super::{cached, AdapterConfig};

/// Everything the patient screen shows at a glance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub patient: String,
    pub total: f64,
    pub payment_count: usize,
    /// Distinct days the patient paid on
    pub visit_count: usize,
    pub paid_total: f64,
    pub unpaid_total: f64,
    pub by_treatment: BTreeMap<String, f64>,
    /// Months with activity, ascending `YYYY-MM`
    pub months: Vec<String>,
    pub last_visit: Option<String>,
}

impl PatientSummary {
    fn empty(patient: &str) -> Self {
        Self {
            patient: patient.to_string(),
            total: 0.0,
            payment_count: 0,
            visit_count: 0,
            paid_total: 0.0,
            unpaid_total: 0.0,
            by_treatment: BTreeMap::new(),
            months: Vec::new(),
            last_visit: None,
        }
    }
}

/// Cached per-patient views bound to one payment source
pub struct PatientAdapter {
    source: Arc<dyn RecordSource<Payment>>,
    manager: Arc<CacheManager>,
    engine: RwLock<Option<Arc<FilterEngine<Payment>>>>,
    summaries: CacheStore<PatientSummary>,
    histories: CacheStore<Vec<Payment>>,
    summary_flight: Singleflight<PatientSummary>,
    history_flight: Singleflight<Vec<Payment>>,
    error: Mutex<Option<String>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl PatientAdapter {
    pub fn new(
        source: Arc<dyn RecordSource<Payment>>,
        manager: Arc<CacheManager>,
        config: AdapterConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            summaries: CacheStore::new(
                "patient_summaries",
                Arc::clone(&manager),
                config.cleanup.clone(),
            ),
            histories: CacheStore::new("patient_history", Arc::clone(&manager), config.cleanup),
            source,
            manager,
            engine: RwLock::new(None),
            summary_flight: Singleflight::new(),
            history_flight: Singleflight::new(),
            error: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }

    /// Watch the source's change stream; replaces any previous watcher
    pub fn start(self: &Arc<Self>) {
        let adapter = Arc::clone(self);
        let mut changes = adapter.source.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        debug!(kind = %change.kind, id = ?change.id, "patient-side change");
                        adapter.invalidate().await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "patient change stream lagged");
                        adapter.invalidate().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = lock(&self.watcher).replace(handle) {
            previous.abort();
        }
    }

    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.watcher).take() {
            handle.abort();
        }
    }

    pub async fn invalidate(&self) {
        *self.engine.write().await = None;
        self.summaries.clear();
        self.histories.clear();
        debug!("patient caches invalidated");
    }

    /// Aggregate view of one patient's payments
    pub async fn patient_summary(&self, patient: &str) -> PatientSummary {
        self.patient_summary_staged(patient, &|_| {}).await
    }

    /// `patient_summary` with staged progress reporting (25/50/75/90/100)
    pub async fn patient_summary_progressively(
        &self,
        patient: &str,
        progress: impl Fn(u8) + Sync,
    ) -> PatientSummary {
        self.patient_summary_staged(patient, &progress).await
    }

    async fn patient_summary_staged(
        &self,
        patient: &str,
        progress: &(dyn Fn(u8) + Sync),
    ) -> PatientSummary {
        progress(25);
        tokio::task::yield_now().await;
        let Some(engine) = self.filter_engine().await else {
            progress(100);
            return PatientSummary::empty(patient);
        };
        progress(50);
        tokio::task::yield_now().await;
        let summary = cached(&self.summaries, &self.summary_flight, patient, || async {
            compute_patient_summary(engine.as_ref(), patient)
        })
        .await;
        progress(75);
        tokio::task::yield_now().await;
        progress(90);
        progress(100);
        summary
    }

    /// The patient's payments in month order (oldest month first)
    pub async fn patient_history(&self, patient: &str) -> Vec<Payment> {
        let Some(engine) = self.filter_engine().await else {
            return Vec::new();
        };
        cached(&self.histories, &self.history_flight, patient, || async {
            engine.engine().all_for_patient(patient)
        })
        .await
    }

    /// The patient's payments within one `YYYY-MM` month, uncached
    ///
    /// Served straight from the composite index; cheap enough that a
    /// cache entry per (patient, month) pair would cost more than it
    /// saves.
    pub async fn payments_in_month(&self, patient: &str, month: &str) -> Vec<Payment> {
        match self.filter_engine().await {
            Some(engine) => engine.engine().by_patient_and_month(patient, month),
            None => Vec::new(),
        }
    }

    /// Periodically age this adapter's stores out via the shared manager
    pub fn schedule_cleanup(self: &Arc<Self>, every: std::time::Duration) {
        let adapter = Arc::clone(self);
        self.manager
            .schedule_periodic_cleanup("patient_caches", every, move || {
                let evicted = adapter.summaries.cleanup() + adapter.histories.cleanup();
                if evicted > 0 {
                    debug!(evicted, "patient cache cleanup pass");
                }
            });
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    async fn filter_engine(&self) -> Option<Arc<FilterEngine<Payment>>> {
        if let Some(engine) = self.engine.read().await.as_ref() {
            return Some(Arc::clone(engine));
        }
        let mut guard = self.engine.write().await;
        if let Some(engine) = guard.as_ref() {
            return Some(Arc::clone(engine));
        }
        match self.source.fetch_all().await {
            Ok(records) => {
                info!(records = records.len(), "rebuilding patient indexes");
                let engine = Arc::new(FilterEngine::new(records, payment_search_text));
                *guard = Some(Arc::clone(&engine));
                *lock(&self.error) = None;
                Some(engine)
            }
            Err(e) => {
                warn!(error = %e, "payment source unavailable, serving empty results");
                *lock(&self.error) = Some(e.to_string());
                None
            }
        }
    }
}

fn compute_patient_summary(engine: &FilterEngine<Payment>, patient: &str) -> PatientSummary {
    let index = engine.engine();
    let records = index.all_for_patient(patient);
    let mut summary = PatientSummary::empty(patient);
    summary.payment_count = records.len();
    summary.months = index.patient_months(patient);
    let mut visit_days = HashSet::new();
    for record in &records {
        let amount = record.amount.unwrap_or(0.0);
        summary.total += amount;
        match record.is_paid {
            Some(true) => summary.paid_total += amount,
            Some(false) => summary.unpaid_total += amount,
            None => {}
        }
        if let Some(treatment) = &record.treatment {
            *summary.by_treatment.entry(treatment.clone()).or_insert(0.0) += amount;
        }
        if let Some(date) = &record.date {
            visit_days.insert(date.clone());
        }
    }
    summary.visit_count = visit_days.len();
    summary.last_visit = visit_days.into_iter().max();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemorySource;

    fn seed() -> Vec<Payment> {
        vec![
            Payment::new(1, "2024-01-05")
                .patient("Sara")
                .treatment("تنظيف")
                .amount(300.0)
                .paid(true),
            Payment::new(2, "2024-01-05")
                .patient("Sara")
                .treatment("filling")
                .amount(450.0)
                .paid(true),
            Payment::new(3, "2024-03-12")
                .patient("Sara")
                .treatment("crown")
                .amount(2500.0)
                .paid(false),
            Payment::new(4, "2024-02-20")
                .patient("Omar")
                .treatment("filling")
                .amount(400.0)
                .paid(true),
        ]
    }

    fn adapter_with(
        records: Vec<Payment>,
    ) -> (Arc<MemorySource<Payment>>, Arc<CacheManager>, Arc<PatientAdapter>) {
        let source = Arc::new(MemorySource::with_records(records));
        let manager = Arc::new(CacheManager::default());
        let adapter = PatientAdapter::new(
            Arc::clone(&source) as Arc<dyn RecordSource<Payment>>,
            Arc::clone(&manager),
            AdapterConfig::patient_defaults(),
        );
        (source, manager, adapter)
    }

    #[tokio::test]
    async fn test_patient_summary_aggregates() {
        let (_source, _manager, adapter) = adapter_with(seed());

        let summary = adapter.patient_summary("Sara").await;
        assert_eq!(summary.payment_count, 3);
        assert_eq!(summary.visit_count, 2);
        assert_eq!(summary.total, 3250.0);
        assert_eq!(summary.paid_total, 750.0);
        assert_eq!(summary.unpaid_total, 2500.0);
        assert_eq!(summary.months, vec!["2024-01", "2024-03"]);
        assert_eq!(summary.last_visit.as_deref(), Some("2024-03-12"));
        assert_eq!(summary.by_treatment["crown"], 2500.0);

        let unknown = adapter.patient_summary("Nobody").await;
        assert_eq!(unknown.payment_count, 0);
        assert!(unknown.months.is_empty());
    }

    #[tokio::test]
    async fn test_patient_history_in_month_order() {
        let (_source, manager, adapter) = adapter_with(seed());

        let history = adapter.patient_history("Sara").await;
        let ids: Vec<u64> = history.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(manager.is_tracked("patient_history-Sara"));
    }

    #[tokio::test]
    async fn test_payments_in_month_uses_composite() {
        let (_source, _manager, adapter) = adapter_with(seed());

        let january = adapter.payments_in_month("Sara", "2024-01").await;
        assert_eq!(january.len(), 2);
        assert!(adapter.payments_in_month("Sara", "2024-02").await.is_empty());
        assert!(adapter.payments_in_month("Omar", "2024-01").await.is_empty());
    }

    #[tokio::test]
    async fn test_progressive_matches_sync_and_reports_stages() {
        let (_source, _manager, adapter) = adapter_with(seed());
        let stages = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&stages);
        let progressive = adapter
            .patient_summary_progressively("Sara", move |stage| {
                lock(&sink).push(stage);
            })
            .await;
        let plain = adapter.patient_summary("Sara").await;

        assert_eq!(progressive, plain);
        assert_eq!(&*lock(&stages), &vec![25, 50, 75, 90, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_event_invalidates() {
        let (source, _manager, adapter) = adapter_with(seed());
        adapter.start();

        let before = adapter.patient_summary("Sara").await;
        assert_eq!(before.payment_count, 3);

        source
            .insert(Payment::new(9, "2024-04-01").patient("Sara").amount(150.0).paid(true))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let after = adapter.patient_summary("Sara").await;
        assert_eq!(after.payment_count, 4);
        assert_eq!(after.months, vec!["2024-01", "2024-03", "2024-04"]);

        adapter.shutdown();
    }
}
