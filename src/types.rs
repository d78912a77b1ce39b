//! Typed row definitions for the logical tables.
//!
//! Each table the ETL step produces has an explicit Rust schema here; the
//! analytics functions only ever see these records, never raw rows.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// One row of the `orders` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub user_id: i64,
    /// Unique order identifier.
    pub order_id: i64,
    pub order_date: DateTime<Utc>,
    /// Positive revenue amount for the order.
    pub revenue: f64,
}

/// One row of the `events` table.
///
/// Events whose timestamp could not be parsed during ETL are stored with a
/// NULL time and are not surfaced as typed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unique event identifier.
    pub event_id: i64,
    pub user_id: i64,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
}

/// Enumerated event categories. Anything unrecognized maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    View,
    AddToCart,
    Checkout,
    Other,
}

impl EventType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "view" => EventType::View,
            "add_to_cart" => EventType::AddToCart,
            "checkout" => EventType::Checkout,
            _ => EventType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::AddToCart => "add_to_cart",
            EventType::Checkout => "checkout",
            EventType::Other => "other",
        }
    }
}

/// One row of the `experiments` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRecord {
    pub test_name: String,
    pub group_id: String,
    pub converted: bool,
}

/// Cohort period granularity for retention analysis.
///
/// A period must have a fixed length in days so that the age of an event is
/// the floor of elapsed days divided by the period length. Calendar months
/// have no fixed length and are intentionally not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
}

impl Period {
    pub fn parse(raw: &str) -> crate::Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Period::Daily),
            "weekly" | "week" | "w" => Ok(Period::Weekly),
            other => anyhow::bail!("unknown period {other:?}; expected 'daily' or 'weekly'"),
        }
    }

    /// Period length in days.
    pub fn days(&self) -> i64 {
        match self {
            Period::Daily => 1,
            Period::Weekly => 7,
        }
    }

    /// The start date of the period containing `at`. Weeks start on Monday.
    pub fn floor(&self, at: DateTime<Utc>) -> NaiveDate {
        let date = at.date_naive();
        match self {
            Period::Daily => date,
            Period::Weekly => {
                date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_type_parse() {
        assert_eq!(EventType::parse("view"), EventType::View);
        assert_eq!(EventType::parse(" add_to_cart "), EventType::AddToCart);
        assert_eq!(EventType::parse("checkout"), EventType::Checkout);
        assert_eq!(EventType::parse("pageview"), EventType::Other);
        assert_eq!(EventType::parse(""), EventType::Other);
    }

    #[test]
    fn test_period_parse() {
        assert_eq!(Period::parse("weekly").unwrap(), Period::Weekly);
        assert_eq!(Period::parse("W").unwrap(), Period::Weekly);
        assert_eq!(Period::parse("daily").unwrap(), Period::Daily);
        assert!(Period::parse("monthly").is_err());
    }

    #[test]
    fn test_weekly_floor_snaps_to_monday() {
        // 2024-01-03 is a Wednesday; its week starts Monday 2024-01-01.
        let wednesday = Utc.with_ymd_and_hms(2024, 1, 3, 15, 30, 0).unwrap();
        assert_eq!(
            Period::Weekly.floor(wednesday),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );

        // A Monday floors to itself.
        let monday = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert_eq!(
            Period::Weekly.floor(monday),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
        );
    }

    #[test]
    fn test_daily_floor_drops_time() {
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        assert_eq!(
            Period::Daily.floor(at),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }
}
