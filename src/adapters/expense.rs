//! Expense Adapter - cached aggregates over the expense source
//!
//! Owns three stores (monthly summaries, category totals, filtered pages)
//! plus one lazily built filter engine. Change events from the source
//! clear everything; the engine is rebuilt on the next read. Getters
//! never fail: when the source is unavailable they record the error and
//! return empty aggregates.

use chrono::{Datelike, NaiveDate};
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
use crate::records::{expense_search_text, Expense, RecordSource};

use super::{cached, AdapterConfig};

/// One month's expense aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub month: String,
    pub total: f64,
    pub count: usize,
    pub paid_total: f64,
    pub unpaid_total: f64,
    pub by_category: BTreeMap<String, f64>,
}

impl MonthlySummary {
    fn empty(month: &str) -> Self {
        Self {
            month: month.to_string(),
            total: 0.0,
            count: 0,
            paid_total: 0.0,
            unpaid_total: 0.0,
            by_category: BTreeMap::new(),
        }
    }
}

/// Running total and count for one category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub total: f64,
    pub count: usize,
}

/// Totals across every category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotals {
    pub by_category: BTreeMap<String, CategoryTotal>,
    pub grand_total: f64,
}

/// Cached expense aggregates bound to one record source
pub struct ExpenseAdapter {
    source: Arc<dyn RecordSource<Expense>>,
    manager: Arc<CacheManager>,
    engine: RwLock<Option<Arc<FilterEngine<Expense>>>>,
    summaries: CacheStore<MonthlySummary>,
    totals: CacheStore<CategoryTotals>,
    pages: CacheStore<Page<Expense>>,
    summary_flight: Singleflight<MonthlySummary>,
    totals_flight: Singleflight<CategoryTotals>,
    page_flight: Singleflight<Page<Expense>>,
    preloaded: Mutex<HashSet<String>>,
    error: Mutex<Option<String>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    preload_delay: std::time::Duration,
}

impl ExpenseAdapter {
    /// Create an adapter over a source, sharing the process cache manager
    pub fn new(
        source: Arc<dyn RecordSource<Expense>>,
        manager: Arc<CacheManager>,
        config: AdapterConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            summaries: CacheStore::new(
                "expense_summaries",
                Arc::clone(&manager),
                config.cleanup.clone(),
            ),
            totals: CacheStore::new(
                "expense_totals",
                Arc::clone(&manager),
                config.cleanup.clone(),
            ),
            pages: CacheStore::new("expense_pages", Arc::clone(&manager), config.cleanup),
            source,
            manager,
            engine: RwLock::new(None),
            summary_flight: Singleflight::new(),
            totals_flight: Singleflight::new(),
            page_flight: Singleflight::new(),
            preloaded: Mutex::new(HashSet::new()),
            error: Mutex::new(None),
            watcher: Mutex::new(None),
            preload_delay: config.preload_delay,
        })
    }

    /// Watch the source's change stream and invalidate on every event
    ///
    /// Calling again replaces the previous watcher.
    pub fn start(self: &Arc<Self>) {
        let adapter = Arc::clone(self);
        let mut changes = adapter.source.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        debug!(kind = %change.kind, id = ?change.id, "expense change");
                        adapter.invalidate().await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "expense change stream lagged");
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

    /// Stop the change watcher, if one is running
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.watcher).take() {
            handle.abort();
        }
    }

    /// Drop every cached value and mark the engine stale
    pub async fn invalidate(&self) {
        *self.engine.write().await = None;
        self.summaries.clear();
        self.totals.clear();
        self.pages.clear();
        lock(&self.preloaded).clear();
        debug!("expense caches invalidated");
    }

    /// Aggregate for one `YYYY-MM` month
    pub async fn monthly_summary(&self, month: &str) -> MonthlySummary {
        self.monthly_summary_staged(month, &|_| {}).await
    }

    /// `monthly_summary` with staged progress reporting (25/50/75/90/100)
    ///
    /// Functionally equivalent to the plain getter; the stages only feed
    /// progress indicators.
    pub async fn monthly_summary_progressively(
        &self,
        month: &str,
        progress: impl Fn(u8) + Sync,
    ) -> MonthlySummary {
        self.monthly_summary_staged(month, &progress).await
    }

    async fn monthly_summary_staged(
        &self,
        month: &str,
        progress: &(dyn Fn(u8) + Sync),
    ) -> MonthlySummary {
        progress(25);
        tokio::task::yield_now().await;
        let Some(engine) = self.filter_engine().await else {
            progress(100);
            return MonthlySummary::empty(month);
        };
        progress(50);
        tokio::task::yield_now().await;
        let summary = cached(&self.summaries, &self.summary_flight, month, || async {
            compute_monthly_summary(engine.as_ref(), month)
        })
        .await;
        progress(75);
        tokio::task::yield_now().await;
        progress(90);
        progress(100);
        summary
    }

    /// Totals and counts per category over the whole collection
    pub async fn category_totals(&self) -> CategoryTotals {
        let Some(engine) = self.filter_engine().await else {
            return CategoryTotals::default();
        };
        cached(&self.totals, &self.totals_flight, "all", || async {
            compute_category_totals(engine.as_ref())
        })
        .await
    }

    /// One page of a filtered expense listing
    pub async fn paginated_expenses(
        &self,
        filter: &RecordFilter,
        page: usize,
        per_page: usize,
    ) -> Page<Expense> {
        let Some(engine) = self.filter_engine().await else {
            return Page::paginate(Vec::new(), page, per_page);
        };
        let key = format!("{}-p{page}-n{per_page}", filter.fingerprint());
        cached(&self.pages, &self.page_flight, &key, || async {
            engine.paginate_filters(filter, page, per_page)
        })
        .await
    }

    /// Text search over the indexed expenses
    pub async fn search(&self, term: &str, options: &SearchOptions) -> Vec<Expense> {
        match self.filter_engine().await {
            Some(engine) => engine.advanced_search(term, options),
            None => Vec::new(),
        }
    }

    /// Precomputed filter statistics, if the engine could be built
    pub async fn filter_stats(&self) -> Option<FilterStats> {
        Some(self.filter_engine().await?.filter_stats().clone())
    }

    /// Warm the summaries of the two neighboring months after a delay
    ///
    /// Deduplicated: a month already preloaded since the last
    /// invalidation is skipped.
    pub fn preload_adjacent_months(self: &Arc<Self>, month: &str) {
        let Some(anchor) = parse_month(month) else {
            warn!(month, "cannot preload around unparsable month key");
            return;
        };
        let neighbors = [month_key(shift_month(anchor, -1)), month_key(shift_month(anchor, 1))];
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
            debug!(months = ?fresh, "preloading adjacent months");
            join_all(fresh.iter().map(|month| adapter.monthly_summary(month))).await;
        });
    }

    /// Months warmed since the last invalidation
    pub fn preloaded_months(&self) -> Vec<String> {
        let mut months: Vec<String> = lock(&self.preloaded).iter().cloned().collect();
        months.sort();
        months
    }

    /// Periodically age this adapter's stores out via the shared manager
    pub fn schedule_cleanup(self: &Arc<Self>, every: std::time::Duration) {
        let adapter = Arc::clone(self);
        self.manager
            .schedule_periodic_cleanup("expense_caches", every, move || {
                let evicted = adapter.summaries.cleanup()
                    + adapter.totals.cleanup()
                    + adapter.pages.cleanup();
                if evicted > 0 {
                    debug!(evicted, "expense cache cleanup pass");
                }
            });
    }

    /// The most recent source failure, if any
    pub fn last_error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    async fn filter_engine(&self) -> Option<Arc<FilterEngine<Expense>>> {
        if let Some(engine) = self.engine.read().await.as_ref() {
            return Some(Arc::clone(engine));
        }
        let mut guard = self.engine.write().await;
        if let Some(engine) = guard.as_ref() {
            return Some(Arc::clone(engine));
        }
        match self.source.fetch_all().await {
            Ok(records) => {
                info!(records = records.len(), "rebuilding expense indexes");
                let engine = Arc::new(FilterEngine::new(records, expense_search_text));
                *guard = Some(Arc::clone(&engine));
                *lock(&self.error) = None;
                Some(engine)
            }
            Err(e) => {
                warn!(error = %e, "expense source unavailable, serving empty results");
                *lock(&self.error) = Some(e.to_string());
                None
            }
        }
    }
}

fn compute_monthly_summary(engine: &FilterEngine<Expense>, month: &str) -> MonthlySummary {
    let records = engine.engine().get_by_index(IndexDimension::Month, month);
    let mut summary = MonthlySummary::empty(month);
    summary.count = records.len();
    for record in &records {
        let amount = record.amount.unwrap_or(0.0);
        summary.total += amount;
        match record.is_paid {
            Some(true) => summary.paid_total += amount,
            Some(false) => summary.unpaid_total += amount,
            None => {}
        }
        if let Some(category) = &record.category {
            *summary.by_category.entry(category.clone()).or_insert(0.0) += amount;
        }
    }
    summary
}

fn compute_category_totals(engine: &FilterEngine<Expense>) -> CategoryTotals {
    let mut totals = CategoryTotals::default();
    for record in engine.engine().records() {
        let amount = record.amount.unwrap_or(0.0);
        totals.grand_total += amount;
        if let Some(category) = &record.category {
            let entry = totals.by_category.entry(category.clone()).or_default();
            entry.total += amount;
            entry.count += 1;
        }
    }
    totals
}

fn parse_month(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d").ok()
}

fn shift_month(date: NaiveDate, offset: i32) -> NaiveDate {
    let months = date.year() * 12 + date.month0() as i32 + offset;
    let (year, month0) = (months.div_euclid(12), months.rem_euclid(12));
    NaiveDate::from_ymd_opt(year, month0 as u32 + 1, 1).unwrap_or(date)
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}
