//! Revenue Adapter - cached payment aggregates per day and month
//!
//! Same lifecycle as the expense adapter, but keyed by day as well as
//! month, with method/treatment breakdowns and distinct-patient counts.

use chrono::NaiveDate;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{lock, CacheManager, CacheStore, Singleflight};
use crate::index::{IndexDimension, SearchOptions};
use crate::query::{FilterEngine, FilterStats, Page, RecordFilter};
use crate::records::{payment_search_text, Payment, RecordSource};

use super::{cached, AdapterConfig};

/// One day's payment aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
    pub date: String,
    pub total: f64,
    pub count: usize,
    pub paid_total: f64,
    pub unpaid_total: f64,
    pub by_method: BTreeMap<String, f64>,
}

impl DailyRevenue {
    fn empty(date: &str) -> Self {
        Self {
            date: date.to_string(),
            total: 0.0,
            count: 0,
            paid_total: 0.0,
            unpaid_total: 0.0,
            by_method: BTreeMap::new(),
        }
    }
}

/// One month's payment aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: String,
    pub total: f64,
    pub count: usize,
    pub paid_total: f64,
    pub unpaid_total: f64,
    pub by_method: BTreeMap<String, f64>,
    pub by_treatment: BTreeMap<String, f64>,
    /// Distinct patients who paid in the month
    pub patient_count: usize,
}

impl MonthlyRevenue {
    fn empty(month: &str) -> Self {
        Self {
            month: month.to_string(),
            total: 0.0,
            count: 0,
            paid_total: 0.0,
            unpaid_total: 0.0,
            by_method: BTreeMap::new(),
            by_treatment: BTreeMap::new(),
            patient_count: 0,
        }
    }
}

/// Cached payment aggregates bound to one record source
pub struct RevenueAdapter {
    source: Arc<dyn RecordSource<Payment>>,
    manager: Arc<CacheManager>,
    engine: RwLock<Option<Arc<FilterEngine<Payment>>>>,
    daily: CacheStore<DailyRevenue>,
    monthly: CacheStore<MonthlyRevenue>,
    pages: CacheStore<Page<Payment>>,
    daily_flight: Singleflight<DailyRevenue>,
    monthly_flight: Singleflight<MonthlyRevenue>,
    page_flight: Singleflight<Page<Payment>>,
    preloaded: Mutex<HashSet<String>>,
    error: Mutex<Option<String>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    preload_delay: std::time::Duration,
}

impl RevenueAdapter {
    pub fn new(
        source: Arc<dyn RecordSource<Payment>>,
        manager: Arc<CacheManager>,
        config: AdapterConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            daily: CacheStore::new("revenue_daily", Arc::clone(&manager), config.cleanup.clone()),
            monthly: CacheStore::new(
                "revenue_monthly",
                Arc::clone(&manager),
                config.cleanup.clone(),
            ),
            pages: CacheStore::new("revenue_pages", Arc::clone(&manager), config.cleanup),
            source,
            manager,
            engine: RwLock::new(None),
            daily_flight: Singleflight::new(),
            monthly_flight: Singleflight::new(),
            page_flight: Singleflight::new(),
            preloaded: Mutex::new(HashSet::new()),
            error: Mutex::new(None),
            watcher: Mutex::new(None),
            preload_delay: config.preload_delay,
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
                        debug!(kind = %change.kind, id = ?change.id, "payment change");
                        adapter.invalidate().await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "payment change stream lagged");
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
        self.daily.clear();
        self.monthly.clear();
        self.pages.clear();
        lock(&self.preloaded).clear();
        debug!("revenue caches invalidated");
    }

    /// Aggregate for one `YYYY-MM-DD` day
    pub async fn daily_revenue(&self, date: &str) -> DailyRevenue {
        self.daily_revenue_staged(date, &|_| {}).await
    }

    /// `daily_revenue` with staged progress reporting (25/50/75/90/100)
    pub async fn daily_revenue_progressively(
        &self,
        date: &str,
        progress: impl Fn(u8) + Sync,
    ) -> DailyRevenue {
        self.daily_revenue_staged(date, &progress).await
    }

    async fn daily_revenue_staged(
        &self,
        date: &str,
        progress: &(dyn Fn(u8) + Sync),
    ) -> DailyRevenue {
        progress(25);
        tokio::task::yield_now().await;
        let Some(engine) = self.filter_engine().await else {
            progress(100);
            return DailyRevenue::empty(date);
        };
        progress(50);
        tokio::task::yield_now().await;
        let revenue = cached(&self.daily, &self.daily_flight, date, || async {
            compute_daily_revenue(engine.as_ref(), date)
        })
        .await;
        progress(75);
        tokio::task::yield_now().await;
        progress(90);
        progress(100);
        revenue
    }

    /// Aggregate for one `YYYY-MM` month
    pub async fn monthly_revenue(&self, month: &str) -> MonthlyRevenue {
        let Some(engine) = self.filter_engine().await else {
            return MonthlyRevenue::empty(month);
        };
        cached(&self.monthly, &self.monthly_flight, month, || async {
            compute_monthly_revenue(engine.as_ref(), month)
        })
        .await
    }

    /// One page of a filtered payment listing
    pub async fn paginated_payments(
        &self,
        filter: &RecordFilter,
        page: usize,
        per_page: usize,
    ) -> Page<Payment> {
        let Some(engine) = self.filter_engine().await else {
            return Page::paginate(Vec::new(), page, per_page);
        };
        let key = format!("{}-p{page}-n{per_page}", filter.fingerprint());
        cached(&self.pages, &self.page_flight, &key, || async {
            engine.paginate_filters(filter, page, per_page)
        })
        .await
    }

    /// Text search over the indexed payments
    pub async fn search(&self, term: &str, options: &SearchOptions) -> Vec<Payment> {
        match self.filter_engine().await {
            Some(engine) => engine.advanced_search(term, options),
            None => Vec::new(),
        }
    }

    pub async fn filter_stats(&self) -> Option<FilterStats> {
        Some(self.filter_engine().await?.filter_stats().clone())
    }

    /// Warm the two neighboring days after a delay, deduplicated
    pub fn preload_adjacent_days(self: &Arc<Self>, date: &str) {
        let Ok(anchor) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
            warn!(date, "cannot preload around unparsable day key");
            return;
        };
        let neighbors = [
            day_key(anchor - chrono::Duration::days(1)),
            day_key(anchor + chrono::Duration::days(1)),
        ];
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(adapter.preload_delay).await;
            let fresh: Vec<String> = {
                let mut seen = lock(&adapter.preloaded);
                neighbors
                    .into_iter()
                    .filter(|neighbor| seen.insert(neighbor.clone()))
                    .collect()
            };
            if fresh.is_empty() {
                return;
            }
            debug!(days = ?fresh, "preloading adjacent days");
            join_all(fresh.iter().map(|day| adapter.daily_revenue(day))).await;
        });
    }

    /// Days warmed since the last invalidation
    pub fn preloaded_days(&self) -> Vec<String> {
        let mut days: Vec<String> = lock(&self.preloaded).iter().cloned().collect();
        days.sort();
        days
    }

    /// Periodically age this adapter's stores out via the shared manager
    pub fn schedule_cleanup(self: &Arc<Self>, every: std::time::Duration) {
        let adapter = Arc::clone(self);
        self.manager
            .schedule_periodic_cleanup("revenue_caches", every, move || {
                let evicted = adapter.daily.cleanup()
                    + adapter.monthly.cleanup()
                    + adapter.pages.cleanup();
                if evicted > 0 {
                    debug!(evicted, "revenue cache cleanup pass");
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
                info!(records = records.len(), "rebuilding payment indexes");
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

fn compute_daily_revenue(engine: &FilterEngine<Payment>, date: &str) -> DailyRevenue {
    let records = engine.engine().get_by_index(IndexDimension::Date, date);
    let mut revenue = DailyRevenue::empty(date);
    revenue.count = records.len();
    for record in &records {
        let amount = record.amount.unwrap_or(0.0);
        revenue.total += amount;
        match record.is_paid {
            Some(true) => revenue.paid_total += amount,
            Some(false) => revenue.unpaid_total += amount,
            None => {}
        }
        if let Some(method) = &record.method {
            *revenue.by_method.entry(method.clone()).or_insert(0.0) += amount;
        }
    }
    revenue
}

fn compute_monthly_revenue(engine: &FilterEngine<Payment>, month: &str) -> MonthlyRevenue {
    let records = engine.engine().get_by_index(IndexDimension::Month, month);
    let mut revenue = MonthlyRevenue::empty(month);
    revenue.count = records.len();
    let mut patients = HashSet::new();
    for record in &records {
        let amount = record.amount.unwrap_or(0.0);
        revenue.total += amount;
        match record.is_paid {
            Some(true) => revenue.paid_total += amount,
            Some(false) => revenue.unpaid_total += amount,
            None => {}
        }
        if let Some(method) = &record.method {
            *revenue.by_method.entry(method.clone()).or_insert(0.0) += amount;
        }
        if let Some(treatment) = &record.treatment {
            *revenue.by_treatment.entry(treatment.clone()).or_insert(0.0) += amount;
        }
        if let Some(patient) = &record.patient {
            patients.insert(patient.clone());
        }
    }
    revenue.patient_count = patients.len();
    revenue
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemorySource;

    fn seed() -> Vec<Payment> {
        vec![
            Payment::new(1, "2024-03-01")
                .patient("Sara")
                .treatment("تنظيف")
                .method("cash")
                .amount(300.0)
                .paid(true),
            Payment::new(2, "2024-03-01")
                .patient("Omar")
                .treatment("crown")
                .method("card")
                .amount(2500.0)
                .paid(false),
            Payment::new(3, "2024-03-15")
                .patient("Sara")
                .treatment("crown")
                .method("cash")
                .amount(1800.0)
                .paid(true),
        ]
    }

    fn adapter_with(
        records: Vec<Payment>,
    ) -> (Arc<MemorySource<Payment>>, Arc<CacheManager>, Arc<RevenueAdapter>) {
        let source = Arc::new(MemorySource::with_records(records));
        let manager = Arc::new(CacheManager::default());
        let adapter = RevenueAdapter::new(
            Arc::clone(&source) as Arc<dyn RecordSource<Payment>>,
            Arc::clone(&manager),
            AdapterConfig::revenue_defaults(),
        );
        (source, manager, adapter)
    }

    #[tokio::test]
    async fn test_daily_revenue_aggregates() {
        let (_source, _manager, adapter) = adapter_with(seed());

        let day = adapter.daily_revenue("2024-03-01").await;
        assert_eq!(day.count, 2);
        assert_eq!(day.total, 2800.0);
        assert_eq!(day.paid_total, 300.0);
        assert_eq!(day.unpaid_total, 2500.0);
        assert_eq!(day.by_method["cash"], 300.0);
        assert_eq!(day.by_method["card"], 2500.0);

        let quiet = adapter.daily_revenue("2024-03-02").await;
        assert_eq!(quiet.count, 0);
    }

    #[tokio::test]
    async fn test_monthly_revenue_counts_distinct_patients() {
        let (_source, _manager, adapter) = adapter_with(seed());

        let month = adapter.monthly_revenue("2024-03").await;
        assert_eq!(month.count, 3);
        assert_eq!(month.total, 4600.0);
        assert_eq!(month.patient_count, 2);
        assert_eq!(month.by_treatment["crown"], 4300.0);
        assert_eq!(month.by_treatment["تنظيف"], 300.0);
    }

    #[tokio::test]
    async fn test_progressive_matches_sync_and_reports_stages() {
        let (_source, _manager, adapter) = adapter_with(seed());
        let stages = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&stages);
        let progressive = adapter
            .daily_revenue_progressively("2024-03-01", move |stage| {
                lock(&sink).push(stage);
            })
            .await;
        let plain = adapter.daily_revenue("2024-03-01").await;

        assert_eq!(progressive, plain);
        assert_eq!(&*lock(&stages), &vec![25, 50, 75, 90, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_crosses_month_boundary() {
        let (_source, manager, adapter) = adapter_with(seed());

        adapter.preload_adjacent_days("2024-03-01");
        tokio::time::sleep(std::time::Duration::from_millis(600)).await;

        // 2024 is a leap year
        assert_eq!(adapter.preloaded_days(), vec!["2024-02-29", "2024-03-02"]);
        assert!(manager.is_tracked("revenue_daily-2024-02-29"));
        assert!(manager.is_tracked("revenue_daily-2024-03-02"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_event_invalidates() {
        let (source, _manager, adapter) = adapter_with(seed());
        adapter.start();

        let before = adapter.daily_revenue("2024-03-01").await;
        assert_eq!(before.count, 2);

        source
            .insert(Payment::new(9, "2024-03-01").patient("Lina").method("cash").amount(500.0))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let after = adapter.daily_revenue("2024-03-01").await;
        assert_eq!(after.count, 3);
        assert_eq!(after.total, 3300.0);

        adapter.shutdown();
    }

    #[tokio::test]
    async fn test_paginated_payments_tracked() {
        let (_source, manager, adapter) = adapter_with(seed());
        let filter = RecordFilter::new().paid(true);

        let page = adapter.paginated_payments(&filter, 1, 2).await;
        assert_eq!(page.total_items, 2);

        let key = format!("{}-p1-n2", filter.fingerprint());
        assert!(manager.is_tracked(&format!("revenue_pages-{key}")));
    }
}
