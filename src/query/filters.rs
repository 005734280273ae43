//! Filter Model - typed filter criteria, sort selection, and pagination
//!
//! Filter criteria are sum types rather than bags of optional fields, so a
//! date criterion is exactly one of nothing, a named preset, or explicit
//! bounds; the preset-versus-explicit precedence question cannot arise.
//! Presets resolve against an explicit `today` so callers and tests stay
//! deterministic.
//!
//! | Preset    | Resolved range (inclusive)        |
//! |-----------|-----------------------------------|
//! | today     | today ..= today                   |
//! | week      | ISO week's Monday ..= today       |
//! | month     | 1st of month ..= today            |
//! | quarter   | 1st of quarter ..= today          |
//! | year      | Jan 1 ..= today                   |

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Named date range anchored to the current calendar period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePreset {
    Today,
    Week,
    Month,
    Quarter,
    Year,
}

impl DatePreset {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "today" => Some(Self::Today),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "quarter" => Some(Self::Quarter),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// Inclusive date range this preset covers as of `today`
    pub fn resolve(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let from = match self {
            Self::Today => today,
            Self::Week => {
                today - Duration::days(today.weekday().num_days_from_monday() as i64)
            }
            Self::Month => today.with_day(1).unwrap_or(today),
            Self::Quarter => {
                let first_month = (today.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(today.year(), first_month, 1).unwrap_or(today)
            }
            Self::Year => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        };
        (from, today)
    }
}

impl std::fmt::Display for DatePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        };
        write!(f, "{name}")
    }
}

/// Date criterion of a filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateFilter {
    /// No date narrowing
    #[default]
    None,
    /// A calendar-anchored named range
    Preset(DatePreset),
    /// Explicit inclusive bounds; either side may be open
    Explicit {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl DateFilter {
    /// Inclusive bounds as of `today`; `None` when the filter is inactive
    pub fn bounds(&self, today: NaiveDate) -> Option<(Option<NaiveDate>, Option<NaiveDate>)> {
        match self {
            Self::None => None,
            Self::Preset(preset) => {
                let (from, to) = preset.resolve(today);
                Some((Some(from), Some(to)))
            }
            Self::Explicit { from, to } => Some((*from, *to)),
        }
    }
}

/// Named amount range
///
/// Preset bands are half-open on the upper side so a value on a boundary
/// belongs to exactly one preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountPreset {
    /// `[0, 1000)`
    Low,
    /// `[1000, 10000)`
    Medium,
    /// `[10000, +inf)`
    High,
}

impl AmountPreset {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Lower bound (inclusive) and upper bound (exclusive, open for High)
    pub fn bounds(&self) -> (f64, Option<f64>) {
        match self {
            Self::Low => (0.0, Some(1000.0)),
            Self::Medium => (1000.0, Some(10000.0)),
            Self::High => (10000.0, None),
        }
    }

    /// Whether an amount falls in this preset's band
    pub fn contains(&self, amount: f64) -> bool {
        let (min, max) = self.bounds();
        amount >= min && max.map_or(true, |m| amount < m)
    }
}

impl std::fmt::Display for AmountPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{name}")
    }
}

/// Amount criterion of a filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AmountFilter {
    /// No amount narrowing
    #[default]
    None,
    /// A named band, half-open on the upper side
    Preset(AmountPreset),
    /// Explicit bounds, inclusive on both sides; either may be open
    Explicit { min: Option<f64>, max: Option<f64> },
}

impl AmountFilter {
    /// Whether an amount passes this criterion
    pub fn accepts(&self, amount: f64) -> bool {
        match self {
            Self::None => true,
            Self::Preset(preset) => preset.contains(amount),
            Self::Explicit { min, max } => {
                min.map_or(true, |m| amount >= m) && max.map_or(true, |m| amount <= m)
            }
        }
    }

    /// Whether this criterion narrows at all
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Sort key for filtered results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Amount,
    Category,
}

impl SortBy {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "date" => Some(Self::Date),
            "amount" => Some(Self::Amount),
            "category" => Some(Self::Category),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Date => "date",
            Self::Amount => "amount",
            Self::Category => "category",
        };
        write!(f, "{name}")
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// Multi-criteria filter applied as an AND-conjunction
///
/// Every active criterion narrows the result further. `categories` is an
/// OR across any of its labels and combines with `category` when both are
/// set. Defaults sort by date, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordFilter {
    pub category: Option<String>,
    pub categories: Vec<String>,
    pub is_paid: Option<bool>,
    pub date: DateFilter,
    pub amount: AmountFilter,
    pub search_term: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl RecordFilter {
    /// An empty filter matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only one category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Keep records in any of these categories
    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Keep only records with this paid status
    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = Some(is_paid);
        self
    }

    /// Keep records in a calendar-anchored named range
    pub fn date_preset(mut self, preset: DatePreset) -> Self {
        self.date = DateFilter::Preset(preset);
        self
    }

    /// Keep records between explicit inclusive date bounds
    pub fn date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date = DateFilter::Explicit { from, to };
        self
    }

    /// Keep records in a named amount band
    pub fn amount_preset(mut self, preset: AmountPreset) -> Self {
        self.amount = AmountFilter::Preset(preset);
        self
    }

    /// Keep records between explicit inclusive amount bounds
    pub fn amount_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.amount = AmountFilter::Explicit { min, max };
        self
    }

    /// Keep records whose text matches a search term
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Choose the sort key and direction
    pub fn sort(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    /// Stable serialized form used as a cache-key component
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One page of results plus pagination bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: usize,
    pub total_pages: usize,
    pub current_page: usize,
    pub items_per_page: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> Page<T> {
    /// Slice one page out of a full result list
    ///
    /// Pages are 1-based; a page number of 0 is treated as 1 and a page
    /// past the end yields an empty item list with the bookkeeping intact.
    pub fn paginate(items: Vec<T>, page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let total_items = items.len();
        let total_pages = (total_items + per_page - 1) / per_page;

        let start = (page - 1) * per_page;
        let page_items: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(per_page)
            .collect();

        Self {
            items: page_items,
            total_items,
            total_pages,
            current_page: page,
            items_per_page: per_page,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_preset_resolution() {
        // 2024-05-17 is a Friday
        let today = date(2024, 5, 17);

        assert_eq!(DatePreset::Today.resolve(today), (today, today));
        assert_eq!(DatePreset::Week.resolve(today), (date(2024, 5, 13), today));
        assert_eq!(DatePreset::Month.resolve(today), (date(2024, 5, 1), today));
        assert_eq!(DatePreset::Quarter.resolve(today), (date(2024, 4, 1), today));
        assert_eq!(DatePreset::Year.resolve(today), (date(2024, 1, 1), today));
    }

    #[test]
    fn test_week_preset_on_a_monday() {
        let monday = date(2024, 5, 13);
        assert_eq!(DatePreset::Week.resolve(monday), (monday, monday));
    }

    #[test]
    fn test_amount_preset_bands() {
        assert!(AmountPreset::Low.contains(999.99));
        assert!(!AmountPreset::Low.contains(1000.0));
        assert!(AmountPreset::Medium.contains(1000.0));
        assert!(!AmountPreset::Medium.contains(10000.0));
        assert!(AmountPreset::High.contains(10000.0));
        assert!(AmountPreset::High.contains(1_000_000.0));
    }

    #[test]
    fn test_explicit_amount_bounds_are_inclusive() {
        let filter = AmountFilter::Explicit {
            min: Some(100.0),
            max: Some(500.0),
        };
        assert!(filter.accepts(100.0));
        assert!(filter.accepts(500.0));
        assert!(!filter.accepts(500.01));

        let open_ended = AmountFilter::Explicit {
            min: Some(100.0),
            max: None,
        };
        assert!(open_ended.accepts(1_000_000.0));
    }

    #[test]
    fn test_pagination_boundary() {
        let items: Vec<u32> = (0..25).collect();
        let page = Page::paginate(items, 3, 10);

        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert!(!page.has_next_page);
        assert!(page.has_previous_page);
    }

    #[test]
    fn test_pagination_middle_page() {
        let items: Vec<u32> = (0..25).collect();
        let page = Page::paginate(items, 2, 10);

        assert_eq!(page.items, (10..20).collect::<Vec<u32>>());
        assert!(page.has_next_page);
        assert!(page.has_previous_page);
    }

    #[test]
    fn test_pagination_empty_and_clamped() {
        let page = Page::paginate(Vec::<u32>::new(), 1, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next_page);
        assert!(!page.has_previous_page);

        // Page 0 is treated as page 1
        let clamped = Page::paginate(vec![1, 2, 3], 0, 2);
        assert_eq!(clamped.current_page, 1);
        assert_eq!(clamped.items, vec![1, 2]);
    }

    #[test]
    fn test_fingerprint_distinguishes_filters() {
        let a = RecordFilter::new().category("lab").paid(false);
        let b = RecordFilter::new().category("lab").paid(true);

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn test_filter_deserializes_with_defaults() {
        let filter: RecordFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter, RecordFilter::new());

        let parsed: RecordFilter =
            serde_json::from_str(r#"{"category":"lab","isPaid":false,"sortBy":"amount"}"#)
                .unwrap();
        assert_eq!(parsed.category.as_deref(), Some("lab"));
        assert_eq!(parsed.is_paid, Some(false));
        assert_eq!(parsed.sort_by, SortBy::Amount);
        assert_eq!(parsed.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_date_filter_bounds() {
        let today = date(2024, 5, 17);
        assert_eq!(DateFilter::None.bounds(today), None);

        let explicit = DateFilter::Explicit {
            from: Some(date(2024, 1, 1)),
            to: None,
        };
        assert_eq!(explicit.bounds(today), Some((Some(date(2024, 1, 1)), None)));

        let preset = DateFilter::Preset(DatePreset::Month);
        assert_eq!(
            preset.bounds(today),
            Some((Some(date(2024, 5, 1)), Some(today)))
        );
    }
}
