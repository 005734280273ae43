//! Core record types for the chairside indexing engine
//!
//! This module defines the fundamental types shared across the crate:
//! - `Indexable`: the contract a record must satisfy to be indexed
//! - `Expense` / `Payment`: the concrete clinic record types
//! - `RecordChange` / `ChangeKind`: mutation notifications from a record source

use serde::{Deserialize, Serialize};

/// A record that can be fed to the index engine.
///
/// Records expose their indexable fields through this trait; every field
/// except the id is optional, and a record missing a field is simply absent
/// from the indexes derived from that field. The raw date stays a string
/// here because malformed input must survive until the engine decides to
/// skip it (with a warning) rather than fail construction.
pub trait Indexable: Clone + Send + Sync + 'static {
    /// Stable unique identifier for the record's lifetime.
    fn id(&self) -> u64;

    /// Raw date string as entered (`YYYY-MM-DD` or full ISO 8601), if any.
    fn date(&self) -> Option<&str>;

    /// Category label used for categorical bucketing.
    fn category(&self) -> Option<&str> {
        None
    }

    /// Monetary amount used for band bucketing and numeric sort.
    fn amount(&self) -> Option<f64> {
        None
    }

    /// Payment status used for status-by-category bucketing.
    fn is_paid(&self) -> Option<bool> {
        None
    }

    /// Patient name used for patient-by-month bucketing.
    fn patient(&self) -> Option<&str> {
        None
    }

    /// Treatment label used for treatment-by-date bucketing.
    fn treatment(&self) -> Option<&str> {
        None
    }
}

/// A clinic expense record
///
/// The primary record type indexed by the expense adapter. All fields
/// beyond the id are optional so partially entered records still index
/// under whatever fields they do carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    /// Unique identifier
    pub id: u64,
    /// Expense date (`YYYY-MM-DD` or full ISO 8601)
    #[serde(default)]
    pub date: Option<String>,
    /// Expense category (supplies, lab, rent, ...)
    #[serde(default)]
    pub category: Option<String>,
    /// Amount in the clinic's currency
    #[serde(default)]
    pub amount: Option<f64>,
    /// Whether the expense has been paid
    #[serde(default)]
    pub is_paid: Option<bool>,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Additional notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Vendor or supplier name
    #[serde(default)]
    pub vendor: Option<String>,
}

impl Expense {
    /// Create a new expense with an id and a date
    pub fn new(id: u64, date: impl Into<String>) -> Self {
        Self {
            id,
            date: Some(date.into()),
            category: None,
            amount: None,
            is_paid: None,
            description: None,
            notes: None,
            vendor: None,
        }
    }

    /// Create an expense with no date (indexed only by id/amount/text)
    pub fn undated(id: u64) -> Self {
        Self {
            id,
            date: None,
            category: None,
            amount: None,
            is_paid: None,
            description: None,
            notes: None,
            vendor: None,
        }
    }

    /// Builder: set category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Builder: set amount
    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Builder: set payment status
    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = Some(is_paid);
        self
    }

    /// Builder: set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: set notes
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Builder: set vendor
    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }
}

impl Indexable for Expense {
    fn id(&self) -> u64 {
        self.id
    }

    fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn amount(&self) -> Option<f64> {
        self.amount
    }

    fn is_paid(&self) -> Option<bool> {
        self.is_paid
    }
}

/// A patient payment record
///
/// Indexed by the revenue and patient-detail adapters. The payment method
/// doubles as the categorical key so revenue can be broken down by how the
/// patient paid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    /// Unique identifier
    pub id: u64,
    /// Payment date (`YYYY-MM-DD` or full ISO 8601)
    #[serde(default)]
    pub date: Option<String>,
    /// Amount in the clinic's currency
    #[serde(default)]
    pub amount: Option<f64>,
    /// Patient name
    #[serde(default)]
    pub patient: Option<String>,
    /// Treatment the payment covers
    #[serde(default)]
    pub treatment: Option<String>,
    /// Payment method (cash, card, transfer, ...)
    #[serde(default)]
    pub method: Option<String>,
    /// Whether the payment has cleared
    #[serde(default)]
    pub is_paid: Option<bool>,
    /// Additional notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl Payment {
    /// Create a new payment with an id and a date
    pub fn new(id: u64, date: impl Into<String>) -> Self {
        Self {
            id,
            date: Some(date.into()),
            amount: None,
            patient: None,
            treatment: None,
            method: None,
            is_paid: None,
            notes: None,
        }
    }

    /// Builder: set amount
    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Builder: set patient name
    pub fn patient(mut self, patient: impl Into<String>) -> Self {
        self.patient = Some(patient.into());
        self
    }

    /// Builder: set treatment
    pub fn treatment(mut self, treatment: impl Into<String>) -> Self {
        self.treatment = Some(treatment.into());
        self
    }

    /// Builder: set payment method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Builder: set cleared status
    pub fn paid(mut self, is_paid: bool) -> Self {
        self.is_paid = Some(is_paid);
        self
    }

    /// Builder: set notes
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl Indexable for Payment {
    fn id(&self) -> u64 {
        self.id
    }

    fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    fn category(&self) -> Option<&str> {
        self.method.as_deref()
    }

    fn amount(&self) -> Option<f64> {
        self.amount
    }

    fn is_paid(&self) -> Option<bool> {
        self.is_paid
    }

    fn patient(&self) -> Option<&str> {
        self.patient.as_deref()
    }

    fn treatment(&self) -> Option<&str> {
        self.treatment.as_deref()
    }
}

/// Kind of mutation a record source reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// A record was inserted
    Added,
    /// A record was modified in place
    Updated,
    /// A record was removed
    Deleted,
    /// A record's payment status was flipped
    PaymentToggled,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::PaymentToggled => write!(f, "paymentToggled"),
        }
    }
}

/// A change notification emitted by a record source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordChange {
    /// What happened
    pub kind: ChangeKind,
    /// The affected record, when a single record was touched
    pub id: Option<u64>,
}

impl RecordChange {
    /// A change affecting one record
    pub fn new(kind: ChangeKind, id: u64) -> Self {
        Self { kind, id: Some(id) }
    }

    /// A change affecting the whole collection (bulk import, reload)
    pub fn bulk(kind: ChangeKind) -> Self {
        Self { kind, id: None }
    }
}

/// Concatenate an expense's free-text fields into one searchable string
pub fn expense_search_text(expense: &Expense) -> String {
    join_text(&[
        expense.description.as_deref(),
        expense.notes.as_deref(),
        expense.category.as_deref(),
        expense.vendor.as_deref(),
    ])
}

/// Concatenate a payment's free-text fields into one searchable string
pub fn payment_search_text(payment: &Payment) -> String {
    join_text(&[
        payment.patient.as_deref(),
        payment.treatment.as_deref(),
        payment.method.as_deref(),
        payment.notes.as_deref(),
    ])
}

fn join_text(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}
