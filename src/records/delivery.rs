//! Delivery status classification
//!
//! Classifies lab requests by how far their expected delivery date is from
//! a reference day: overdue, due today, due tomorrow, or further out. This
//! is a pure function over a batch of requests, it holds no index state and
//! shares only the date parsing with the temporal index.

use crate::index::parse_record_date;
use crate::query::Page;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A lab request awaiting delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryRequest {
    /// Unique identifier
    pub id: u64,
    /// Patient the work is for
    #[serde(default)]
    pub patient: Option<String>,
    /// What was ordered (crown, denture, ...)
    #[serde(default)]
    pub description: Option<String>,
    /// Expected delivery date (`YYYY-MM-DD` or full ISO 8601)
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Where a request stands relative to the reference day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "days")]
pub enum DeliveryStatus {
    /// Delivery date already passed, by this many days
    Overdue(i64),
    /// Due on the reference day
    DueToday,
    /// Due the day after the reference day
    DueTomorrow,
    /// Due this many days out (always >= 2)
    Future(i64),
}

impl DeliveryStatus {
    /// The status without its day count
    pub fn kind(&self) -> DeliveryKind {
        match self {
            Self::Overdue(_) => DeliveryKind::Overdue,
            Self::DueToday => DeliveryKind::DueToday,
            Self::DueTomorrow => DeliveryKind::DueTomorrow,
            Self::Future(_) => DeliveryKind::Future,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overdue(days) => write!(f, "overdue by {} days", days),
            Self::DueToday => write!(f, "due today"),
            Self::DueTomorrow => write!(f, "due tomorrow"),
            Self::Future(days) => write!(f, "due in {} days", days),
        }
    }
}

/// Status kind used for filtering a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryKind {
    Overdue,
    DueToday,
    DueTomorrow,
    Future,
}

impl DeliveryKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "overdue" => Some(Self::Overdue),
            "today" | "duetoday" => Some(Self::DueToday),
            "tomorrow" | "duetomorrow" => Some(Self::DueTomorrow),
            "future" | "upcoming" => Some(Self::Future),
            _ => None,
        }
    }
}

/// A request paired with its classification
///
/// `status` is `None` when the request has no parseable delivery date;
/// such requests are kept in the batch rather than dropped so a caller
/// can still show them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedRequest {
    pub request: DeliveryRequest,
    pub status: Option<DeliveryStatus>,
}

/// Classify a delivery date against a reference day
pub fn classify_delivery(due: NaiveDate, today: NaiveDate) -> DeliveryStatus {
    let delta = (due - today).num_days();
    match delta {
        d if d < 0 => DeliveryStatus::Overdue(-d),
        0 => DeliveryStatus::DueToday,
        1 => DeliveryStatus::DueTomorrow,
        d => DeliveryStatus::Future(d),
    }
}

/// Classify a whole batch of requests against a reference day
pub fn classify_requests(requests: &[DeliveryRequest], today: NaiveDate) -> Vec<ClassifiedRequest> {
    requests
        .iter()
        .map(|request| {
            let status = request
                .due_date
                .as_deref()
                .and_then(parse_record_date)
                .map(|due| classify_delivery(due, today));
            ClassifiedRequest {
                request: request.clone(),
                status,
            }
        })
        .collect()
}

/// Filter a batch by status kind and return one page of results
///
/// With `wanted = None` every classified request passes the filter,
/// including ones with no parseable date.
pub fn filter_requests(
    requests: &[DeliveryRequest],
    today: NaiveDate,
    wanted: Option<DeliveryKind>,
    page: usize,
    per_page: usize,
) -> Page<ClassifiedRequest> {
    let matching: Vec<ClassifiedRequest> = classify_requests(requests, today)
        .into_iter()
        .filter(|classified| match wanted {
            Some(kind) => classified.status.map(|s| s.kind()) == Some(kind),
            None => true,
        })
        .collect();

    Page::paginate(matching, page, per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn request(id: u64, due: &str) -> DeliveryRequest {
        DeliveryRequest {
            id,
            patient: None,
            description: None,
            due_date: Some(due.to_string()),
        }
    }

    #[test]
    fn test_classify_delivery() {
        let today = day("2024-03-10");

        assert_eq!(
            classify_delivery(day("2024-03-07"), today),
            DeliveryStatus::Overdue(3)
        );
        assert_eq!(
            classify_delivery(day("2024-03-10"), today),
            DeliveryStatus::DueToday
        );
        assert_eq!(
            classify_delivery(day("2024-03-11"), today),
            DeliveryStatus::DueTomorrow
        );
        assert_eq!(
            classify_delivery(day("2024-03-15"), today),
            DeliveryStatus::Future(5)
        );
    }

    #[test]
    fn test_classify_batch_keeps_bad_dates() {
        let requests = vec![
            request(1, "2024-03-09"),
            DeliveryRequest {
                id: 2,
                patient: None,
                description: None,
                due_date: Some("not-a-date".to_string()),
            },
            DeliveryRequest {
                id: 3,
                patient: None,
                description: None,
                due_date: None,
            },
        ];

        let classified = classify_requests(&requests, day("2024-03-10"));
        assert_eq!(classified.len(), 3);
        assert_eq!(classified[0].status, Some(DeliveryStatus::Overdue(1)));
        assert_eq!(classified[1].status, None);
        assert_eq!(classified[2].status, None);
    }

    #[test]
    fn test_filter_by_kind() {
        let requests = vec![
            request(1, "2024-03-08"),
            request(2, "2024-03-09"),
            request(3, "2024-03-10"),
            request(4, "2024-03-11"),
            request(5, "2024-03-20"),
        ];
        let today = day("2024-03-10");

        let overdue = filter_requests(&requests, today, Some(DeliveryKind::Overdue), 1, 10);
        assert_eq!(overdue.total_items, 2);
        assert_eq!(overdue.items[0].request.id, 1);

        let tomorrow = filter_requests(&requests, today, Some(DeliveryKind::DueTomorrow), 1, 10);
        assert_eq!(tomorrow.total_items, 1);
        assert_eq!(tomorrow.items[0].request.id, 4);
    }

    #[test]
    fn test_filter_pagination() {
        let requests: Vec<DeliveryRequest> =
            (1..=25).map(|id| request(id, "2024-03-05")).collect();
        let today = day("2024-03-10");

        let page = filter_requests(&requests, today, Some(DeliveryKind::Overdue), 3, 10);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next_page);
        assert!(page.has_previous_page);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(DeliveryStatus::Overdue(3).to_string(), "overdue by 3 days");
        assert_eq!(DeliveryStatus::DueToday.to_string(), "due today");
        assert_eq!(DeliveryStatus::Future(7).to_string(), "due in 7 days");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(DeliveryKind::from_str("overdue"), Some(DeliveryKind::Overdue));
        assert_eq!(DeliveryKind::from_str("TODAY"), Some(DeliveryKind::DueToday));
        assert_eq!(DeliveryKind::from_str("nope"), None);
    }
}
