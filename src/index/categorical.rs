//! Categorical Index - category, status, amount-band, and composite buckets
//!
//! Single-level buckets map one key (category label, paid status, amount
//! band) to record positions. Composite buckets are two-level maps enabling
//! lookups by a key pair, e.g. "supplies expenses on 2024-01-05" or "Sara's
//! payments in 2024-03". Inner maps are created on demand during the build
//! pass and bucket lists keep insertion order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed amount bands used to bucket monetary values
///
/// Bands are contiguous half-open `[min, max)` intervals covering zero to
/// infinity: a value exactly on a boundary belongs to the upper band, so
/// 10000 lands in `10000-50000`, not `5000-10000`. Values below zero fall
/// into the first band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountBand {
    /// `[0, 100)`
    UpTo100,
    /// `[100, 500)`
    UpTo500,
    /// `[500, 1000)`
    UpTo1K,
    /// `[1000, 5000)`
    UpTo5K,
    /// `[5000, 10000)`
    UpTo10K,
    /// `[10000, 50000)`
    UpTo50K,
    /// `[50000, +inf)`
    Over50K,
}

impl AmountBand {
    /// Every band, ordered ascending
    pub fn all() -> [AmountBand; 7] {
        [
            Self::UpTo100,
            Self::UpTo500,
            Self::UpTo1K,
            Self::UpTo5K,
            Self::UpTo10K,
            Self::UpTo50K,
            Self::Over50K,
        ]
    }

    /// The band a value falls in
    pub fn classify(amount: f64) -> Self {
        match amount {
            a if a < 100.0 => Self::UpTo100,
            a if a < 500.0 => Self::UpTo500,
            a if a < 1000.0 => Self::UpTo1K,
            a if a < 5000.0 => Self::UpTo5K,
            a if a < 10000.0 => Self::UpTo10K,
            a if a < 50000.0 => Self::UpTo50K,
            _ => Self::Over50K,
        }
    }

    /// Bucket key label, e.g. `1000-5000` or `50000+`
    pub fn label(&self) -> &'static str {
        match self {
            Self::UpTo100 => "0-100",
            Self::UpTo500 => "100-500",
            Self::UpTo1K => "500-1000",
            Self::UpTo5K => "1000-5000",
            Self::UpTo10K => "5000-10000",
            Self::UpTo50K => "10000-50000",
            Self::Over50K => "50000+",
        }
    }

    /// Parse a bucket key label back to a band
    pub fn from_label(label: &str) -> Option<Self> {
        Self::all().into_iter().find(|band| band.label() == label)
    }
}

impl std::fmt::Display for AmountBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Payment status bucket key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaidStatus {
    Paid,
    Unpaid,
}

impl PaidStatus {
    /// Map a record's paid flag to a status key
    pub fn from_flag(is_paid: bool) -> Self {
        if is_paid {
            Self::Paid
        } else {
            Self::Unpaid
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "paid" => Some(Self::Paid),
            "unpaid" => Some(Self::Unpaid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paid => write!(f, "paid"),
            Self::Unpaid => write!(f, "unpaid"),
        }
    }
}

type Composite = HashMap<String, HashMap<String, Vec<usize>>>;

/// Category, status, amount-band, and composite buckets over positions
#[derive(Debug, Default)]
pub struct CategoricalIndex {
    by_category: HashMap<String, Vec<usize>>,
    by_status: HashMap<PaidStatus, Vec<usize>>,
    by_amount_band: HashMap<AmountBand, Vec<usize>>,
    by_date_and_category: Composite,
    by_month_and_category: Composite,
    by_status_and_category: HashMap<PaidStatus, HashMap<String, Vec<usize>>>,
    by_patient_and_month: Composite,
    by_treatment_and_date: Composite,
}

impl CategoricalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a position to a category bucket
    pub fn add_category(&mut self, position: usize, category: &str) {
        self.by_category
            .entry(category.to_string())
            .or_default()
            .push(position);
    }

    /// Append a position to a paid-status bucket
    pub fn add_status(&mut self, position: usize, status: PaidStatus) {
        self.by_status.entry(status).or_default().push(position);
    }

    /// Classify an amount and append the position to its band bucket
    pub fn add_amount(&mut self, position: usize, amount: f64) -> AmountBand {
        let band = AmountBand::classify(amount);
        self.by_amount_band.entry(band).or_default().push(position);
        band
    }

    /// Append to the date x category composite
    pub fn add_date_category(&mut self, position: usize, day_key: &str, category: &str) {
        self.by_date_and_category
            .entry(day_key.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default()
            .push(position);
    }

    /// Append to the month x category composite
    pub fn add_month_category(&mut self, position: usize, month_key: &str, category: &str) {
        self.by_month_and_category
            .entry(month_key.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default()
            .push(position);
    }

    /// Append to the status x category composite
    pub fn add_status_category(&mut self, position: usize, status: PaidStatus, category: &str) {
        self.by_status_and_category
            .entry(status)
            .or_default()
            .entry(category.to_string())
            .or_default()
            .push(position);
    }

    /// Append to the patient x month composite
    pub fn add_patient_month(&mut self, position: usize, patient: &str, month_key: &str) {
        self.by_patient_and_month
            .entry(patient.to_string())
            .or_default()
            .entry(month_key.to_string())
            .or_default()
            .push(position);
    }

    /// Append to the treatment x date composite
    pub fn add_treatment_date(&mut self, position: usize, treatment: &str, day_key: &str) {
        self.by_treatment_and_date
            .entry(treatment.to_string())
            .or_default()
            .entry(day_key.to_string())
            .or_default()
            .push(position);
    }

    /// Positions in a category
    pub fn in_category(&self, category: &str) -> &[usize] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Positions with a paid status
    pub fn with_status(&self, status: PaidStatus) -> &[usize] {
        self.by_status
            .get(&status)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Positions in an amount band
    pub fn in_band(&self, band: AmountBand) -> &[usize] {
        self.by_amount_band
            .get(&band)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Positions for a day key and category pair
    pub fn on_date_in_category(&self, day_key: &str, category: &str) -> &[usize] {
        Self::composite_get(&self.by_date_and_category, day_key, category)
    }

    /// Positions for a month key and category pair
    pub fn in_month_in_category(&self, month_key: &str, category: &str) -> &[usize] {
        Self::composite_get(&self.by_month_and_category, month_key, category)
    }

    /// Positions for a paid status and category pair
    pub fn with_status_in_category(&self, status: PaidStatus, category: &str) -> &[usize] {
        self.by_status_and_category
            .get(&status)
            .and_then(|inner| inner.get(category))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Positions for a patient and month key pair
    pub fn of_patient_in_month(&self, patient: &str, month_key: &str) -> &[usize] {
        Self::composite_get(&self.by_patient_and_month, patient, month_key)
    }

    /// Positions for a treatment and day key pair
    pub fn of_treatment_on_date(&self, treatment: &str, day_key: &str) -> &[usize] {
        Self::composite_get(&self.by_treatment_and_date, treatment, day_key)
    }

    /// Month keys a patient has records in, sorted ascending
    pub fn patient_months(&self, patient: &str) -> Vec<String> {
        let mut months: Vec<String> = self
            .by_patient_and_month
            .get(patient)
            .map(|inner| inner.keys().cloned().collect())
            .unwrap_or_default();
        months.sort();
        months
    }

    /// Every position for a patient, months in ascending key order
    pub fn all_of_patient(&self, patient: &str) -> Vec<usize> {
        let mut positions = Vec::new();
        for month in self.patient_months(patient) {
            positions.extend_from_slice(self.of_patient_in_month(patient, &month));
        }
        positions
    }

    /// All category labels currently holding records, sorted ascending
    pub fn category_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.by_category.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of distinct categories
    pub fn category_count(&self) -> usize {
        self.by_category.len()
    }

    /// Discard all buckets
    pub fn clear(&mut self) {
        self.by_category.clear();
        self.by_status.clear();
        self.by_amount_band.clear();
        self.by_date_and_category.clear();
        self.by_month_and_category.clear();
        self.by_status_and_category.clear();
        self.by_patient_and_month.clear();
        self.by_treatment_and_date.clear();
    }

    /// Rough memory footprint of the bucket maps in bytes
    pub fn approx_bytes(&self) -> usize {
        let single: usize = self
            .by_category
            .iter()
            .map(|(key, bucket)| key.len() + bucket.len() * std::mem::size_of::<usize>())
            .sum();

        let flat: usize = self
            .by_status
            .values()
            .chain(self.by_amount_band.values())
            .map(|bucket| bucket.len() * std::mem::size_of::<usize>())
            .sum();

        let composites = [
            &self.by_date_and_category,
            &self.by_month_and_category,
            &self.by_patient_and_month,
            &self.by_treatment_and_date,
        ]
        .iter()
        .map(|outer| Self::composite_bytes(outer))
        .sum::<usize>();

        let status_composite: usize = self
            .by_status_and_category
            .values()
            .map(|inner| {
                inner
                    .iter()
                    .map(|(key, bucket)| key.len() + bucket.len() * std::mem::size_of::<usize>())
                    .sum::<usize>()
            })
            .sum();

        single + flat + composites + status_composite
    }

    fn composite_get<'a>(map: &'a Composite, outer: &str, inner: &str) -> &'a [usize] {
        map.get(outer)
            .and_then(|second| second.get(inner))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn composite_bytes(map: &Composite) -> usize {
        map.iter()
            .map(|(outer, inner)| {
                outer.len()
                    + inner
                        .iter()
                        .map(|(key, bucket)| {
                            key.len() + bucket.len() * std::mem::size_of::<usize>()
                        })
                        .sum::<usize>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_classification() {
        assert_eq!(AmountBand::classify(0.0), AmountBand::UpTo100);
        assert_eq!(AmountBand::classify(99.99), AmountBand::UpTo100);
        assert_eq!(AmountBand::classify(250.0), AmountBand::UpTo500);
        assert_eq!(AmountBand::classify(7500.0), AmountBand::UpTo10K);
        assert_eq!(AmountBand::classify(60000.0), AmountBand::Over50K);
    }

    #[test]
    fn test_band_boundary_goes_to_upper_band() {
        // Half-open intervals: a boundary value belongs to the band above
        assert_eq!(AmountBand::classify(100.0), AmountBand::UpTo500);
        assert_eq!(AmountBand::classify(1000.0), AmountBand::UpTo5K);
        assert_eq!(AmountBand::classify(10000.0), AmountBand::UpTo50K);
        assert_eq!(AmountBand::classify(50000.0), AmountBand::Over50K);
    }

    #[test]
    fn test_band_negative_amount() {
        assert_eq!(AmountBand::classify(-5.0), AmountBand::UpTo100);
    }

    #[test]
    fn test_band_labels_round_trip() {
        for band in AmountBand::all() {
            assert_eq!(AmountBand::from_label(band.label()), Some(band));
        }
        assert_eq!(AmountBand::from_label("weird"), None);
    }

    #[test]
    fn test_category_buckets() {
        let mut index = CategoricalIndex::new();
        index.add_category(0, "supplies");
        index.add_category(1, "lab");
        index.add_category(2, "supplies");

        assert_eq!(index.in_category("supplies"), &[0, 2]);
        assert_eq!(index.in_category("lab"), &[1]);
        assert!(index.in_category("rent").is_empty());
        assert_eq!(index.category_keys(), vec!["lab", "supplies"]);
    }

    #[test]
    fn test_status_buckets() {
        let mut index = CategoricalIndex::new();
        index.add_status(0, PaidStatus::Paid);
        index.add_status(1, PaidStatus::Unpaid);
        index.add_status(2, PaidStatus::Paid);

        assert_eq!(index.with_status(PaidStatus::Paid), &[0, 2]);
        assert_eq!(index.with_status(PaidStatus::Unpaid), &[1]);
    }

    #[test]
    fn test_amount_band_buckets() {
        let mut index = CategoricalIndex::new();
        assert_eq!(index.add_amount(0, 50.0), AmountBand::UpTo100);
        assert_eq!(index.add_amount(1, 10000.0), AmountBand::UpTo50K);

        assert_eq!(index.in_band(AmountBand::UpTo100), &[0]);
        assert_eq!(index.in_band(AmountBand::UpTo50K), &[1]);
        assert!(index.in_band(AmountBand::Over50K).is_empty());
    }

    #[test]
    fn test_composite_buckets() {
        let mut index = CategoricalIndex::new();
        index.add_date_category(0, "2024-01-05", "supplies");
        index.add_date_category(1, "2024-01-05", "lab");
        index.add_month_category(0, "2024-01", "supplies");
        index.add_status_category(0, PaidStatus::Paid, "supplies");

        assert_eq!(index.on_date_in_category("2024-01-05", "supplies"), &[0]);
        assert_eq!(index.on_date_in_category("2024-01-05", "lab"), &[1]);
        assert!(index.on_date_in_category("2024-01-06", "supplies").is_empty());
        assert_eq!(index.in_month_in_category("2024-01", "supplies"), &[0]);
        assert_eq!(
            index.with_status_in_category(PaidStatus::Paid, "supplies"),
            &[0]
        );
        assert!(index
            .with_status_in_category(PaidStatus::Unpaid, "supplies")
            .is_empty());
    }

    #[test]
    fn test_patient_months() {
        let mut index = CategoricalIndex::new();
        index.add_patient_month(0, "Sara", "2024-03");
        index.add_patient_month(1, "Sara", "2024-01");
        index.add_patient_month(2, "Omar", "2024-02");
        index.add_patient_month(3, "Sara", "2024-03");

        assert_eq!(index.patient_months("Sara"), vec!["2024-01", "2024-03"]);
        // Flattened in month order, insertion order within a month
        assert_eq!(index.all_of_patient("Sara"), vec![1, 0, 3]);
        assert!(index.all_of_patient("Nadia").is_empty());
    }

    #[test]
    fn test_treatment_date() {
        let mut index = CategoricalIndex::new();
        index.add_treatment_date(0, "تنظيف", "2024-01-05");

        assert_eq!(index.of_treatment_on_date("تنظيف", "2024-01-05"), &[0]);
        assert!(index.of_treatment_on_date("حشو", "2024-01-05").is_empty());
    }

    #[test]
    fn test_clear() {
        let mut index = CategoricalIndex::new();
        index.add_category(0, "supplies");
        index.add_status(0, PaidStatus::Paid);
        index.clear();

        assert!(index.in_category("supplies").is_empty());
        assert_eq!(index.category_count(), 0);
    }
}
