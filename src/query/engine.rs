//! Filter Engine - multi-criteria filtering over one indexed snapshot
//!
//! Wraps an `IndexEngine` and adds its own light single-level maps
//! (category, paid status, amount band, a word inverted map) built once at
//! construction. `apply_filters` runs a sequential AND-conjunction:
//!
//! ```text
//! seed (category bucket | all) -> categories OR -> paid status
//!      -> date bounds -> amount bounds -> search term -> sort
//! ```
//!
//! Aggregate counts are precomputed at construction and served from
//! `filter_stats` without rescanning. Sorting is stable; descending order
//! reverses the ascending comparator, so records with equal keys keep
//! their ascending-order relative positions.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::index::{
    parse_record_date, tokenize, AmountBand, IndexEngine, PaidStatus, SearchOptions,
};
use crate::records::Indexable;

use super::filters::{Page, RecordFilter, SortBy, SortOrder};

/// Aggregate counts over the snapshot, precomputed at construction
#[derive(Debug, Clone, Serialize)]
pub struct FilterStats {
    pub total_records: usize,
    pub by_category: BTreeMap<String, usize>,
    pub paid: usize,
    pub unpaid: usize,
    /// Non-empty amount bands in ascending band order
    pub by_band: Vec<(String, usize)>,
}

impl std::fmt::Display for FilterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records ({} paid / {} unpaid), {} categories, {} amount bands",
            self.total_records,
            self.paid,
            self.unpaid,
            self.by_category.len(),
            self.by_band.len()
        )
    }
}

/// Multi-criteria filter facade over one `IndexEngine`
pub struct FilterEngine<R> {
    engine: IndexEngine<R>,
    by_category: HashMap<String, Vec<usize>>,
    paid: Vec<usize>,
    unpaid: Vec<usize>,
    by_band: HashMap<AmountBand, Vec<usize>>,
    words: HashMap<String, BTreeSet<usize>>,
    stats: FilterStats,
}

impl<R> std::fmt::Debug for FilterEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("records", &self.stats.total_records)
            .field("categories", &self.stats.by_category.len())
            .finish()
    }
}

impl<R: Indexable + Clone> FilterEngine<R> {
    /// Index `records` and build the filter layer over them
    pub fn new(
        records: Vec<R>,
        extract_text: impl Fn(&R) -> String + Send + Sync + 'static,
    ) -> Self {
        Self::wrap(IndexEngine::with_records(records, extract_text))
    }

    /// Build the filter layer over an already-built engine
    pub fn wrap(engine: IndexEngine<R>) -> Self {
        let mut by_category: HashMap<String, Vec<usize>> = HashMap::new();
        let mut paid = Vec::new();
        let mut unpaid = Vec::new();
        let mut by_band: HashMap<AmountBand, Vec<usize>> = HashMap::new();
        let mut words: HashMap<String, BTreeSet<usize>> = HashMap::new();

        for (position, record) in engine.records().iter().enumerate() {
            if let Some(category) = record.category() {
                by_category.entry(category.to_string()).or_default().push(position);
            }
            match record.is_paid() {
                Some(true) => paid.push(position),
                Some(false) => unpaid.push(position),
                None => {}
            }
            if let Some(amount) = record.amount() {
                by_band.entry(AmountBand::classify(amount)).or_default().push(position);
            }
            for token in tokenize(&engine.searchable_text(record)) {
                words.entry(token).or_default().insert(position);
            }
        }

        let stats = FilterStats {
            total_records: engine.len(),
            by_category: by_category
                .iter()
                .map(|(category, bucket)| (category.clone(), bucket.len()))
                .collect(),
            paid: paid.len(),
            unpaid: unpaid.len(),
            by_band: AmountBand::all()
                .into_iter()
                .filter_map(|band| {
                    by_band
                        .get(&band)
                        .map(|bucket| (band.label().to_string(), bucket.len()))
                })
                .collect(),
        };

        Self {
            engine,
            by_category,
            paid,
            unpaid,
            by_band,
            words,
            stats,
        }
    }

    /// Apply a filter as of the current calendar date
    pub fn apply_filters(&self, filter: &RecordFilter) -> Vec<R> {
        self.apply_filters_asof(filter, Utc::now().date_naive())
    }

    /// Apply a filter with an explicit `today` for preset resolution
    pub fn apply_filters_asof(&self, filter: &RecordFilter, today: NaiveDate) -> Vec<R> {
        let records = self.engine.records();

        let mut positions: Vec<usize> = match &filter.category {
            Some(category) => self
                .by_category
                .get(category)
                .cloned()
                .unwrap_or_default(),
            None => (0..records.len()).collect(),
        };

        if !filter.categories.is_empty() {
            positions.retain(|&position| {
                records[position]
                    .category()
                    .map_or(false, |category| {
                        filter.categories.iter().any(|want| want == category)
                    })
            });
        }

        if let Some(want) = filter.is_paid {
            positions.retain(|&position| records[position].is_paid() == Some(want));
        }

        if let Some((from, to)) = filter.date.bounds(today) {
            positions.retain(|&position| {
                records[position]
                    .date()
                    .and_then(parse_record_date)
                    .map_or(false, |date| {
                        from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
                    })
            });
        }

        if filter.amount.is_active() {
            positions.retain(|&position| {
                records[position]
                    .amount()
                    .map_or(false, |amount| filter.amount.accepts(amount))
            });
        }

        if let Some(term) = &filter.search_term {
            let tokens = tokenize(term);
            if !tokens.is_empty() {
                let matched = self.term_positions(&tokens);
                positions.retain(|position| matched.contains(position));
            }
        }

        self.sort_positions(&mut positions, filter.sort_by, filter.sort_order);
        positions
            .into_iter()
            .filter_map(|position| records.get(position).cloned())
            .collect()
    }

    /// Apply a filter and slice one page of the result
    pub fn paginate_filters(&self, filter: &RecordFilter, page: usize, per_page: usize) -> Page<R> {
        Page::paginate(self.apply_filters(filter), page, per_page)
    }

    /// Paginating variant with an explicit `today`
    pub fn paginate_filters_asof(
        &self,
        filter: &RecordFilter,
        today: NaiveDate,
        page: usize,
        per_page: usize,
    ) -> Page<R> {
        Page::paginate(self.apply_filters_asof(filter, today), page, per_page)
    }

    /// Full text search, delegated to the underlying engine
    pub fn advanced_search(&self, term: &str, options: &SearchOptions) -> Vec<R> {
        self.engine.search(term, options)
    }

    /// Precomputed aggregate counts
    pub fn filter_stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Records on a day in a category
    pub fn by_date_and_category(&self, day_key: &str, category: &str) -> Vec<R> {
        self.engine.by_date_and_category(day_key, category)
    }

    /// Records in a month in a category
    pub fn by_month_and_category(&self, month_key: &str, category: &str) -> Vec<R> {
        self.engine.by_month_and_category(month_key, category)
    }

    /// Records with a paid status in a category
    pub fn by_status_and_category(&self, status: PaidStatus, category: &str) -> Vec<R> {
        self.engine.by_status_and_category(status, category)
    }

    /// Precomputed full sort for date and amount; category is derived on
    /// demand since it is rarely asked for
    pub fn sorted(&self, sort_by: SortBy) -> Vec<R> {
        match sort_by {
            SortBy::Date => self.engine.sorted_by_date(),
            SortBy::Amount => self.engine.sorted_by_amount(),
            SortBy::Category => {
                let mut positions: Vec<usize> = (0..self.engine.len()).collect();
                self.sort_positions(&mut positions, SortBy::Category, SortOrder::Asc);
                positions
                    .into_iter()
                    .filter_map(|position| self.engine.records().get(position).cloned())
                    .collect()
            }
        }
    }

    /// The wrapped index engine
    pub fn engine(&self) -> &IndexEngine<R> {
        &self.engine
    }

    /// Positions matching every search token; per token, the buckets of
    /// all indexed words containing it are unioned, then tokens intersect
    fn term_positions(&self, tokens: &[String]) -> BTreeSet<usize> {
        let mut matched: Option<BTreeSet<usize>> = None;
        for token in tokens {
            let mut token_hits = BTreeSet::new();
            for (word, bucket) in &self.words {
                if word.contains(token.as_str()) {
                    token_hits.extend(bucket.iter().copied());
                }
            }
            matched = Some(match matched {
                Some(narrowed) => narrowed.intersection(&token_hits).copied().collect(),
                None => token_hits,
            });
        }
        matched.unwrap_or_default()
    }

    fn sort_positions(&self, positions: &mut [usize], sort_by: SortBy, sort_order: SortOrder) {
        let records = self.engine.records();
        positions.sort_by(|&a, &b| {
            let ascending = match sort_by {
                SortBy::Date => cmp_missing_last(records[a].date(), records[b].date()),
                SortBy::Amount => match (records[a].amount(), records[b].amount()) {
                    (Some(left), Some(right)) => left.total_cmp(&right),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
                SortBy::Category => {
                    cmp_missing_last(records[a].category(), records[b].category())
                }
            };
            match sort_order {
                SortOrder::Asc => ascending,
                SortOrder::Desc => ascending.reverse(),
            }
        });
    }
}

/// Ascending comparison where a missing key sorts last
fn cmp_missing_last(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(left), Some(right)) => left.cmp(right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{AmountPreset, DatePreset};
    use crate::records::{expense_search_text, Expense};

    fn conjunction_fixture() -> FilterEngine<Expense> {
        FilterEngine::new(
            vec![
                Expense::new(1, "2024-01-05").category("A").amount(100.0).paid(true),
                Expense::new(2, "2024-02-10").category("A").amount(5000.0).paid(false),
                Expense::new(3, "2024-01-20").category("B").amount(200.0).paid(false),
            ],
            expense_search_text,
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_filter_conjunction() {
        let engine = conjunction_fixture();
        let filter = RecordFilter::new().category("A").paid(false);

        let hits = engine.apply_filters(&filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn test_categories_or_list() {
        let engine = conjunction_fixture();
        let filter = RecordFilter::new()
            .categories(vec!["A".into(), "B".into()])
            .paid(false)
            .sort(SortBy::Date, SortOrder::Asc);

        let ids: Vec<u64> = engine.apply_filters(&filter).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_date_preset_asof() {
        let engine = conjunction_fixture();
        let filter = RecordFilter::new().date_preset(DatePreset::Month);

        // As of Jan 25, the month preset covers Jan 1..=25
        let hits = engine.apply_filters_asof(&filter, date(2024, 1, 25));
        let ids: Vec<u64> = hits.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_explicit_date_range_open_ended() {
        let engine = conjunction_fixture();
        let filter = RecordFilter::new()
            .date_range(Some(date(2024, 1, 21)), None)
            .sort(SortBy::Date, SortOrder::Asc);

        let ids: Vec<u64> = engine.apply_filters(&filter).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_amount_preset_and_explicit() {
        let engine = conjunction_fixture();

        let low = engine.apply_filters(&RecordFilter::new().amount_preset(AmountPreset::Low));
        let low_ids: Vec<u64> = low.iter().map(|e| e.id).collect();
        assert_eq!(low_ids, vec![3, 1]);

        let filter = RecordFilter::new().amount_range(Some(200.0), Some(5000.0));
        let explicit: Vec<u64> = engine.apply_filters(&filter).iter().map(|e| e.id).collect();
        // Inclusive on both ends
        assert_eq!(explicit, vec![2, 3]);
    }

    #[test]
    fn test_search_term_narrows() {
        let engine = FilterEngine::new(
            vec![
                Expense::new(1, "2024-01-05").category("lab").description("crown mold delivery"),
                Expense::new(2, "2024-01-06").category("lab").description("crown cement"),
                Expense::new(3, "2024-01-07").category("supplies").description("gloves"),
            ],
            expense_search_text,
        );

        let one_token = engine.apply_filters(&RecordFilter::new().search("crown"));
        assert_eq!(one_token.len(), 2);

        // Tokens AND together
        let two_tokens = engine.apply_filters(&RecordFilter::new().search("crown cement"));
        assert_eq!(two_tokens.len(), 1);
        assert_eq!(two_tokens[0].id, 2);

        // A term that tokenizes to nothing does not narrow
        let blank = engine.apply_filters(&RecordFilter::new().search("  a  "));
        assert_eq!(blank.len(), 3);
    }

    #[test]
    fn test_sort_stability_with_desc() {
        let engine = FilterEngine::new(
            vec![
                Expense::new(1, "2024-01-01").amount(500.0),
                Expense::new(2, "2024-01-02").amount(500.0),
                Expense::new(3, "2024-01-03").amount(900.0),
            ],
            expense_search_text,
        );

        let filter = RecordFilter::new().sort(SortBy::Amount, SortOrder::Desc);
        let ids: Vec<u64> = engine.apply_filters(&filter).iter().map(|e| e.id).collect();
        // Equal amounts keep their original relative order under desc
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_paginate_filters() {
        let records: Vec<Expense> = (1..=25)
            .map(|id| Expense::new(id, "2024-01-05").category("A").amount(id as f64))
            .collect();
        let engine = FilterEngine::new(records, expense_search_text);

        let filter = RecordFilter::new().category("A").sort(SortBy::Amount, SortOrder::Asc);
        let page = engine.paginate_filters(&filter, 3, 10);

        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next_page);
        assert!(page.has_previous_page);
        assert_eq!(page.items[0].id, 21);
    }

    #[test]
    fn test_filter_stats_precomputed() {
        let engine = conjunction_fixture();
        let stats = engine.filter_stats();

        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.paid, 1);
        assert_eq!(stats.unpaid, 2);
        assert_eq!(stats.by_category.get("A"), Some(&2));
        assert_eq!(stats.by_category.get("B"), Some(&1));
        // 100 and 200 share a band; 5000 has its own
        assert_eq!(
            stats.by_band,
            vec![
                ("100-500".to_string(), 2),
                ("5000-10000".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_sorted_delegates_and_category_on_demand() {
        let engine = conjunction_fixture();

        let by_amount: Vec<u64> = engine.sorted(SortBy::Amount).iter().map(|e| e.id).collect();
        assert_eq!(by_amount, vec![1, 3, 2]);

        let by_category: Vec<u64> = engine.sorted(SortBy::Category).iter().map(|e| e.id).collect();
        assert_eq!(by_category, vec![1, 2, 3]);
    }

    #[test]
    fn test_unknown_category_seed_is_empty() {
        let engine = conjunction_fixture();
        let hits = engine.apply_filters(&RecordFilter::new().category("Z"));
        assert!(hits.is_empty());
    }

    #[test]
    fn test_advanced_search_delegates() {
        let engine = FilterEngine::new(
            vec![Expense::new(1, "2024-01-05").description("علاج تنظيف")],
            expense_search_text,
        );
        let hits = engine.advanced_search("تنظيف", &SearchOptions::default());
        assert_eq!(hits.len(), 1);
    }
}
