//! Index Engine - single-pass construction of every secondary index
//!
//! The engine snapshots a record collection into a `Vec` and derives all
//! index structures from it in one pass per rebuild:
//!
//! - id map (last write wins on id collisions)
//! - temporal buckets (day/month/year/week/quarter/semester)
//! - categorical buckets plus two-key composites
//! - inverted word/phrase text indexes over a caller-supplied search string
//! - full-collection sorts by amount and by date
//!
//! Rebuilds are wholesale: `update_data` discards all prior state, so the
//! structures are never mutated incrementally and a rebuild with the same
//! records reproduces identical buckets. Records whose date is missing or
//! unparsable are skipped from date-keyed structures only, with a warning;
//! they stay reachable by id, amount band, and text search. Lookups with
//! unknown keys return empty collections, never errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::records::Indexable;

use super::{
    parse_record_date, tokenize, AmountBand, BucketKeys, CategoricalIndex, IndexDimension,
    PaidStatus, TemporalIndex, TextIndex,
};

/// Post-build statistics for observability
#[derive(Debug, Clone, Serialize)]
pub struct BuildStats {
    /// Records in the snapshot, including ones without a usable date
    pub record_count: usize,
    /// Records skipped from date-keyed structures
    pub skipped_dates: usize,
    /// Distinct day buckets
    pub day_buckets: usize,
    /// Distinct indexed words
    pub indexed_words: usize,
    /// When the last rebuild finished
    pub built_at: DateTime<Utc>,
    /// How long the last rebuild took
    pub build_duration_ms: u64,
    /// Estimated index memory footprint
    pub approx_memory_bytes: usize,
}

impl BuildStats {
    fn empty() -> Self {
        Self {
            record_count: 0,
            skipped_dates: 0,
            day_buckets: 0,
            indexed_words: 0,
            built_at: Utc::now(),
            build_duration_ms: 0,
            approx_memory_bytes: 0,
        }
    }
}

impl std::fmt::Display for BuildStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records, {} day buckets, {} words, {} skipped dates, ~{:.1} KB, built in {} ms",
            self.record_count,
            self.day_buckets,
            self.indexed_words,
            self.skipped_dates,
            self.approx_memory_bytes as f64 / 1024.0,
            self.build_duration_ms
        )
    }
}

/// Options narrowing a text search
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Match the query as a raw substring of each record's full text
    pub exact: bool,
    /// Widen token matching with the character-overlap heuristic
    pub fuzzy: bool,
    /// Keep only records with this exact category
    pub category: Option<String>,
    /// Keep only records whose raw date string lies in this inclusive range
    pub date_range: Option<(String, String)>,
    /// Keep only records whose amount lies in this inclusive range
    pub amount_range: Option<(f64, f64)>,
}

impl SearchOptions {
    /// Match the full text as a substring instead of by tokens
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Enable fuzzy token matching
    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    /// Restrict results to one category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restrict results to an inclusive raw-date range
    pub fn date_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.date_range = Some((from.into(), to.into()));
        self
    }

    /// Restrict results to an inclusive amount range
    pub fn amount_range(mut self, min: f64, max: f64) -> Self {
        self.amount_range = Some((min, max));
        self
    }
}

/// All secondary indexes over one record snapshot
pub struct IndexEngine<R> {
    records: Vec<R>,
    by_id: HashMap<u64, usize>,
    temporal: TemporalIndex,
    categorical: CategoricalIndex,
    text: TextIndex,
    sorted_by_amount: Vec<usize>,
    sorted_by_date: Vec<usize>,
    stats: BuildStats,
    extract_text: Arc<dyn Fn(&R) -> String + Send + Sync>,
}

impl<R> std::fmt::Debug for IndexEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEngine")
            .field("records", &self.records.len())
            .field("day_buckets", &self.temporal.day_bucket_count())
            .field("words", &self.text.word_count())
            .finish()
    }
}

impl<R: Indexable + Clone> IndexEngine<R> {
    /// Create an empty engine with a searchable-text extractor
    pub fn new(extract_text: impl Fn(&R) -> String + Send + Sync + 'static) -> Self {
        Self {
            records: Vec::new(),
            by_id: HashMap::new(),
            temporal: TemporalIndex::new(),
            categorical: CategoricalIndex::new(),
            text: TextIndex::new(),
            sorted_by_amount: Vec::new(),
            sorted_by_date: Vec::new(),
            stats: BuildStats::empty(),
            extract_text: Arc::new(extract_text),
        }
    }

    /// Create an engine and build all indexes over `records`
    pub fn with_records(
        records: Vec<R>,
        extract_text: impl Fn(&R) -> String + Send + Sync + 'static,
    ) -> Self {
        let mut engine = Self::new(extract_text);
        engine.update_data(records);
        engine
    }

    /// Replace the snapshot and rebuild every index from scratch
    pub fn update_data(&mut self, records: Vec<R>) {
        let started = Instant::now();

        self.records = records;
        self.by_id.clear();
        self.temporal.clear();
        self.categorical.clear();
        self.text.clear();
        self.sorted_by_amount.clear();
        self.sorted_by_date.clear();

        let mut skipped_dates = 0usize;

        for (position, record) in self.records.iter().enumerate() {
            self.by_id.insert(record.id(), position);

            let bucket_keys = match record.date() {
                Some(raw) => match parse_record_date(raw) {
                    Some(date) => {
                        self.temporal.add(position, date);
                        Some(BucketKeys::for_date(date))
                    }
                    None => {
                        skipped_dates += 1;
                        warn!(
                            id = record.id(),
                            date = raw,
                            "unparsable record date, skipping temporal buckets"
                        );
                        None
                    }
                },
                None => {
                    skipped_dates += 1;
                    warn!(id = record.id(), "record has no date, skipping temporal buckets");
                    None
                }
            };

            if let Some(category) = record.category() {
                self.categorical.add_category(position, category);
                if let Some(keys) = &bucket_keys {
                    self.categorical.add_date_category(position, &keys.day, category);
                    self.categorical.add_month_category(position, &keys.month, category);
                }
            }

            if let Some(is_paid) = record.is_paid() {
                let status = PaidStatus::from_flag(is_paid);
                self.categorical.add_status(position, status);
                if let Some(category) = record.category() {
                    self.categorical.add_status_category(position, status, category);
                }
            }

            if let Some(amount) = record.amount() {
                self.categorical.add_amount(position, amount);
            }

            if let Some(keys) = &bucket_keys {
                if let Some(patient) = record.patient() {
                    self.categorical.add_patient_month(position, patient, &keys.month);
                }
                if let Some(treatment) = record.treatment() {
                    self.categorical.add_treatment_date(position, treatment, &keys.day);
                }
            }

            let text = (self.extract_text)(record);
            self.text.index_record(position, &text);
        }

        let mut by_amount: Vec<usize> = (0..self.records.len())
            .filter(|&position| self.records[position].amount().is_some())
            .collect();
        by_amount.sort_by(|&a, &b| {
            let left = self.records[a].amount().unwrap_or(0.0);
            let right = self.records[b].amount().unwrap_or(0.0);
            left.total_cmp(&right)
        });
        self.sorted_by_amount = by_amount;

        let mut by_date: Vec<usize> = (0..self.records.len()).collect();
        by_date.sort_by(|&a, &b| {
            match (self.records[a].date(), self.records[b].date()) {
                (Some(left), Some(right)) => left.cmp(right),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
        self.sorted_by_date = by_date;

        let approx_memory_bytes = self.records.len() * std::mem::size_of::<R>()
            + self.by_id.len() * (std::mem::size_of::<u64>() + std::mem::size_of::<usize>())
            + (self.sorted_by_amount.len() + self.sorted_by_date.len())
                * std::mem::size_of::<usize>()
            + self.temporal.approx_bytes()
            + self.categorical.approx_bytes()
            + self.text.approx_bytes();

        self.stats = BuildStats {
            record_count: self.records.len(),
            skipped_dates,
            day_buckets: self.temporal.day_bucket_count(),
            indexed_words: self.text.word_count(),
            built_at: Utc::now(),
            build_duration_ms: started.elapsed().as_millis() as u64,
            approx_memory_bytes,
        };

        debug!(
            records = self.stats.record_count,
            skipped = skipped_dates,
            duration_ms = self.stats.build_duration_ms,
            "indexes rebuilt"
        );
    }

    /// Text search over the snapshot
    ///
    /// Exact mode matches the lower-cased query as a substring of each
    /// record's full searchable text. Token mode tokenizes the query like
    /// indexing does, seeds candidates from the phrase index for
    /// multi-word queries, then unions the bucket of every indexed word
    /// containing (or fuzzy-matching) each query token. Candidates are
    /// then narrowed by the option filters. Results come back in record
    /// insertion order.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<R> {
        let candidates: Vec<usize> = if options.exact {
            self.text.exact_positions(query)
        } else {
            let tokens = tokenize(query);
            let mut positions = BTreeSet::new();
            if tokens.len() > 1 {
                positions.extend(self.text.phrase_positions(query));
            }
            for token in &tokens {
                positions.extend(self.text.lookup(token, options.fuzzy));
            }
            positions.into_iter().collect()
        };

        candidates
            .into_iter()
            .filter_map(|position| self.records.get(position))
            .filter(|record| match &options.category {
                Some(want) => record.category() == Some(want.as_str()),
                None => true,
            })
            .filter(|record| match &options.date_range {
                Some((from, to)) => record
                    .date()
                    .map_or(false, |date| date >= from.as_str() && date <= to.as_str()),
                None => true,
            })
            .filter(|record| match options.amount_range {
                Some((min, max)) => record
                    .amount()
                    .map_or(false, |amount| amount >= min && amount <= max),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Direct bucket lookup on any single-key dimension
    pub fn get_by_index(&self, dimension: IndexDimension, key: &str) -> Vec<R> {
        let positions: Vec<usize> = match dimension {
            IndexDimension::Date => self.temporal.on_day(key).to_vec(),
            IndexDimension::Month => self.temporal.in_month(key).to_vec(),
            IndexDimension::Year => self.temporal.in_year(key).to_vec(),
            IndexDimension::Week => self.temporal.in_week(key).to_vec(),
            IndexDimension::Quarter => self.temporal.in_quarter(key).to_vec(),
            IndexDimension::Semester => self.temporal.in_semester(key).to_vec(),
            IndexDimension::Category => self.categorical.in_category(key).to_vec(),
            IndexDimension::Status => PaidStatus::from_str(key)
                .map(|status| self.categorical.with_status(status).to_vec())
                .unwrap_or_default(),
            IndexDimension::AmountBand => AmountBand::from_label(key)
                .map(|band| self.categorical.in_band(band).to_vec())
                .unwrap_or_default(),
        };
        self.materialize(&positions)
    }

    /// Records on a day in a category
    pub fn by_date_and_category(&self, day_key: &str, category: &str) -> Vec<R> {
        self.materialize(self.categorical.on_date_in_category(day_key, category))
    }

    /// Records in a month in a category
    pub fn by_month_and_category(&self, month_key: &str, category: &str) -> Vec<R> {
        self.materialize(self.categorical.in_month_in_category(month_key, category))
    }

    /// Records with a paid status in a category
    pub fn by_status_and_category(&self, status: PaidStatus, category: &str) -> Vec<R> {
        self.materialize(self.categorical.with_status_in_category(status, category))
    }

    /// Records for a patient in a month
    pub fn by_patient_and_month(&self, patient: &str, month_key: &str) -> Vec<R> {
        self.materialize(self.categorical.of_patient_in_month(patient, month_key))
    }

    /// Records for a treatment on a day
    pub fn by_treatment_and_date(&self, treatment: &str, day_key: &str) -> Vec<R> {
        self.materialize(self.categorical.of_treatment_on_date(treatment, day_key))
    }

    /// Every record for a patient, months ascending
    pub fn all_for_patient(&self, patient: &str) -> Vec<R> {
        self.materialize(&self.categorical.all_of_patient(patient))
    }

    /// Month keys a patient has records in, ascending
    pub fn patient_months(&self, patient: &str) -> Vec<String> {
        self.categorical.patient_months(patient)
    }

    /// Look a record up by id
    pub fn record_by_id(&self, id: u64) -> Option<&R> {
        self.by_id.get(&id).and_then(|&position| self.records.get(position))
    }

    /// The searchable string this engine derives from a record
    pub fn searchable_text(&self, record: &R) -> String {
        (self.extract_text)(record)
    }

    /// The full snapshot in insertion order
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Number of records in the snapshot
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Full collection ascending by amount; records without an amount are
    /// excluded
    pub fn sorted_by_amount(&self) -> Vec<R> {
        self.materialize(&self.sorted_by_amount)
    }

    /// Full collection ascending by raw date string; undated records sort
    /// last
    pub fn sorted_by_date(&self) -> Vec<R> {
        self.materialize(&self.sorted_by_date)
    }

    /// All category labels present, sorted
    pub fn category_keys(&self) -> Vec<String> {
        self.categorical.category_keys()
    }

    /// Month bucket keys present, sorted
    pub fn month_keys(&self) -> Vec<String> {
        self.temporal.month_keys()
    }

    /// Day bucket keys present, sorted
    pub fn day_keys(&self) -> Vec<String> {
        self.temporal.day_keys()
    }

    /// Statistics from the last rebuild
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    fn materialize(&self, positions: &[usize]) -> Vec<R> {
        positions
            .iter()
            .filter_map(|&position| self.records.get(position).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{expense_search_text, payment_search_text, Expense, Payment};

    fn sample_expenses() -> Vec<Expense> {
        vec![
            Expense::new(1, "2024-01-05")
                .category("supplies")
                .amount(250.0)
                .paid(true)
                .description("gloves and masks"),
            Expense::new(2, "2024-01-20")
                .category("lab")
                .amount(1200.0)
                .paid(false)
                .description("crown mold"),
            Expense::new(3, "2024-02-10")
                .category("supplies")
                .amount(80.0)
                .paid(false)
                .description("تنظيف أدوات"),
            Expense::new(4, "not-a-date")
                .category("rent")
                .amount(10000.0)
                .paid(true)
                .description("clinic rent"),
        ]
    }

    fn build_engine() -> IndexEngine<Expense> {
        IndexEngine::with_records(sample_expenses(), expense_search_text)
    }

    #[test]
    fn test_completeness_across_temporal_buckets() {
        let engine = build_engine();

        let on_day = engine.get_by_index(IndexDimension::Date, "2024-01-05");
        assert_eq!(on_day.len(), 1);
        assert_eq!(on_day[0].id, 1);

        let in_month: Vec<u64> = engine
            .get_by_index(IndexDimension::Month, "2024-01")
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(in_month, vec![1, 2]);

        let in_year: Vec<u64> = engine
            .get_by_index(IndexDimension::Year, "2024")
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(in_year, vec![1, 2, 3]);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut engine = build_engine();
        let before: Vec<u64> = engine
            .get_by_index(IndexDimension::Month, "2024-01")
            .iter()
            .map(|e| e.id)
            .collect();

        engine.update_data(sample_expenses());
        let after: Vec<u64> = engine
            .get_by_index(IndexDimension::Month, "2024-01")
            .iter()
            .map(|e| e.id)
            .collect();

        assert_eq!(before, after);
        assert_eq!(engine.stats().record_count, 4);
    }

    #[test]
    fn test_bad_date_skipped_from_temporal_only() {
        let engine = build_engine();

        // Absent from every date-keyed structure
        assert!(engine.get_by_index(IndexDimension::Date, "not-a-date").is_empty());
        for month in engine.month_keys() {
            assert!(engine
                .get_by_index(IndexDimension::Month, &month)
                .iter()
                .all(|e| e.id != 4));
        }

        // Still reachable by id, amount band, and text
        assert!(engine.record_by_id(4).is_some());
        let banded = engine.get_by_index(IndexDimension::AmountBand, "10000-50000");
        assert_eq!(banded.len(), 1);
        assert_eq!(banded[0].id, 4);
        let hits = engine.search("rent", &SearchOptions::default());
        assert!(hits.iter().any(|e| e.id == 4));

        assert_eq!(engine.stats().skipped_dates, 1);
    }

    #[test]
    fn test_id_collision_last_write_wins() {
        let records = vec![
            Expense::new(7, "2024-01-01").amount(10.0),
            Expense::new(7, "2024-01-02").amount(20.0),
        ];
        let engine = IndexEngine::with_records(records, expense_search_text);

        let record = engine.record_by_id(7).unwrap();
        assert_eq!(record.amount, Some(20.0));
    }

    #[test]
    fn test_search_recall() {
        let engine = build_engine();

        let hits = engine.search("تنظيف", &SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 3);

        assert!(engine.search("zirconia", &SearchOptions::default()).is_empty());
    }

    #[test]
    fn test_search_exact_substring() {
        let engine = build_engine();

        let hits = engine.search("crown mo", &SearchOptions::default().exact());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn test_search_post_filters() {
        let engine = build_engine();
        // "supplies" hits records 1 and 3 via their category word; the
        // option filters then narrow to the January one in band
        let options = SearchOptions::default()
            .category("supplies")
            .date_range("2024-01-01", "2024-01-31")
            .amount_range(100.0, 500.0);
        let hits = engine.search("supplies", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn test_sorted_by_amount_ascending_excluding_missing() {
        let mut records = sample_expenses();
        records.push(Expense::new(5, "2024-03-01").category("misc"));
        let engine = IndexEngine::with_records(records, expense_search_text);

        let amounts: Vec<f64> = engine
            .sorted_by_amount()
            .iter()
            .filter_map(|e| e.amount)
            .collect();
        assert_eq!(amounts, vec![80.0, 250.0, 1200.0, 10000.0]);
        assert_eq!(engine.sorted_by_amount().len(), 4);
    }

    #[test]
    fn test_sorted_by_date_undated_last() {
        let records = vec![
            Expense::undated(1).amount(5.0),
            Expense::new(2, "2024-02-01").amount(6.0),
            Expense::new(3, "2024-01-01").amount(7.0),
        ];
        let engine = IndexEngine::with_records(records, expense_search_text);

        let ids: Vec<u64> = engine.sorted_by_date().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_unknown_keys_yield_empty() {
        let engine = build_engine();
        assert!(engine.get_by_index(IndexDimension::Date, "1999-01-01").is_empty());
        assert!(engine.get_by_index(IndexDimension::Category, "nonexistent").is_empty());
        assert!(engine.get_by_index(IndexDimension::Status, "maybe").is_empty());
        assert!(engine.by_date_and_category("2024-01-05", "lab").is_empty());
        assert!(engine.record_by_id(999).is_none());
    }

    #[test]
    fn test_composite_and_patient_buckets() {
        let payments = vec![
            Payment::new(1, "2024-01-05")
                .patient("Sara")
                .treatment("تنظيف")
                .amount(300.0)
                .paid(true),
            Payment::new(2, "2024-03-11")
                .patient("Sara")
                .treatment("حشو")
                .amount(450.0)
                .paid(false),
            Payment::new(3, "2024-01-05")
                .patient("Omar")
                .treatment("تنظيف")
                .amount(300.0)
                .paid(true),
        ];
        let engine = IndexEngine::with_records(payments, payment_search_text);

        assert_eq!(engine.patient_months("Sara"), vec!["2024-01", "2024-03"]);
        let sara: Vec<u64> = engine.all_for_patient("Sara").iter().map(|p| p.id).collect();
        assert_eq!(sara, vec![1, 2]);

        let cleanings = engine.by_treatment_and_date("تنظيف", "2024-01-05");
        assert_eq!(cleanings.len(), 2);

        let sara_january = engine.by_patient_and_month("Sara", "2024-01");
        assert_eq!(sara_january.len(), 1);
        assert_eq!(sara_january[0].id, 1);
    }

    #[test]
    fn test_date_and_status_composites() {
        let engine = build_engine();

        let supplies_jan5 = engine.by_date_and_category("2024-01-05", "supplies");
        assert_eq!(supplies_jan5.len(), 1);
        assert_eq!(supplies_jan5[0].id, 1);

        let supplies_jan = engine.by_month_and_category("2024-01", "supplies");
        assert_eq!(supplies_jan.len(), 1);

        let unpaid_supplies = engine.by_status_and_category(PaidStatus::Unpaid, "supplies");
        assert_eq!(unpaid_supplies.len(), 1);
        assert_eq!(unpaid_supplies[0].id, 3);
    }

    #[test]
    fn test_stats_after_build() {
        let engine = build_engine();
        let stats = engine.stats();

        assert_eq!(stats.record_count, 4);
        assert_eq!(stats.skipped_dates, 1);
        assert_eq!(stats.day_buckets, 3);
        assert!(stats.indexed_words > 0);
        assert!(stats.approx_memory_bytes > 0);
        assert!(!stats.to_string().is_empty());
    }
}
