//! Analytics engine: RFM segmentation, cohort retention, and A/B test
//! summaries.
//!
//! Every function here is a pure derivation over typed rows queried from an
//! explicitly passed [`Store`]. Nothing is cached; each call recomputes
//! from the database.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::store::Store;
use crate::types::Period;

/// Precondition violations surfaced to callers as typed errors.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("experiment {test_name:?} has {found} groups; exactly two are required")]
    ExperimentGroups { test_name: String, found: usize },

    #[error("no experiment records found for test {0:?}")]
    UnknownExperiment(String),
}

/// Derived Recency/Frequency/Monetary record for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRecord {
    pub user_id: i64,
    /// Whole days between the user's latest order and the snapshot date
    /// (the latest order date across all users).
    pub recency: i64,
    /// Distinct order count.
    pub frequency: u32,
    /// Total revenue.
    pub monetary: f64,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    /// Concatenation of the R, F, M digits, e.g. `"331"`.
    pub segment: String,
}

/// One cohort row of the retention table.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRow {
    /// Start date of the signup period.
    pub cohort: NaiveDate,
    /// Distinct users whose signup period is this cohort.
    pub size: u32,
    /// Retention fraction per age, index 0 ..= max observed age. The age-0
    /// entry is 1.0 by construction.
    pub fractions: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RetentionTable {
    pub period: Period,
    pub rows: Vec<CohortRow>,
}

impl RetentionTable {
    /// Highest age column present in the grid.
    pub fn max_age(&self) -> usize {
        self.rows.first().map_or(0, |row| row.fractions.len() - 1)
    }
}

/// Aggregates for one experiment group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub group_id: String,
    pub conversions: u32,
    pub observations: u32,
    pub conversion_rate: f64,
}

/// Two-group A/B test summary.
#[derive(Debug, Clone)]
pub struct AbTestSummary {
    pub test_name: String,
    /// Exactly two groups, ordered ascending by group id.
    pub groups: Vec<GroupSummary>,
    /// Later-listed group's rate minus the earlier one's.
    pub lift: f64,
    /// Two-sided p-value from the normal-approximation z-test.
    pub p_value: f64,
}

/// Classic RFM segmentation over the full orders table.
///
/// Returns one record per distinct user with at least one order, sorted by
/// user id. Tertile cut-points are the 33rd and 66th percentiles computed
/// independently per dimension; scores use strictly-greater-than
/// comparisons against the cut-points, so values exactly at a cut-point
/// fall into the lower band.
pub fn rfm_segmentation(store: &Store) -> crate::Result<Vec<RfmRecord>> {
    let orders = store.load_orders()?;

    let snapshot = match orders.iter().map(|o| o.order_date).max() {
        Some(latest) => latest,
        None => return Ok(Vec::new()),
    };

    struct UserAgg {
        last_order: DateTime<Utc>,
        order_ids: HashSet<i64>,
        monetary: f64,
    }

    let mut per_user: BTreeMap<i64, UserAgg> = BTreeMap::new();
    for order in &orders {
        let agg = per_user.entry(order.user_id).or_insert_with(|| UserAgg {
            last_order: order.order_date,
            order_ids: HashSet::new(),
            monetary: 0.0,
        });
        agg.last_order = agg.last_order.max(order.order_date);
        agg.order_ids.insert(order.order_id);
        agg.monetary += order.revenue;
    }

    let base: Vec<(i64, i64, u32, f64)> = per_user
        .iter()
        .map(|(&user_id, agg)| {
            let recency = (snapshot - agg.last_order).num_days();
            (user_id, recency, agg.order_ids.len() as u32, agg.monetary)
        })
        .collect();

    let recency_cuts = tertile_cuts(base.iter().map(|r| r.1 as f64));
    let frequency_cuts = tertile_cuts(base.iter().map(|r| r.2 as f64));
    let monetary_cuts = tertile_cuts(base.iter().map(|r| r.3));

    let records = base
        .into_iter()
        .map(|(user_id, recency, frequency, monetary)| {
            let r_score = inverted_score(recency as f64, recency_cuts);
            let f_score = direct_score(frequency as f64, frequency_cuts);
            let m_score = direct_score(monetary, monetary_cuts);
            RfmRecord {
                user_id,
                recency,
                frequency,
                monetary,
                r_score,
                f_score,
                m_score,
                segment: format!("{r_score}{f_score}{m_score}"),
            }
        })
        .collect();
    Ok(records)
}

/// (33rd, 66th) percentile cut-points of one dimension.
fn tertile_cuts(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    (percentile(&sorted, 0.33), percentile(&sorted, 0.66))
}

/// Linear-interpolation percentile over pre-sorted values: the value at
/// fractional rank `q * (n - 1)`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let frac = pos - lower as f64;
    if lower + 1 < sorted.len() {
        sorted[lower] + frac * (sorted[lower + 1] - sorted[lower])
    } else {
        sorted[lower]
    }
}

/// Recency scoring: lower is better, so the most-recent third scores 3.
fn inverted_score(value: f64, (q33, q66): (f64, f64)) -> u8 {
    3 - (value > q66) as u8 - (value > q33) as u8
}

/// Frequency/monetary scoring: the highest third scores 3.
fn direct_score(value: f64, (q33, q66): (f64, f64)) -> u8 {
    1 + (value > q33) as u8 + (value > q66) as u8
}

/// Cohort retention grid over the events table.
///
/// Rows are signup cohorts (the period containing each user's earliest
/// event), columns are ages in whole periods, and cells are the fraction of
/// the cohort active at that age, rounded to 3 decimals. Every user is
/// active at age 0 by construction, so the age-0 column is exactly 1.0.
pub fn cohort_retention(store: &Store, period: Period) -> crate::Result<RetentionTable> {
    let events = store.load_events()?;

    let mut signup: HashMap<i64, DateTime<Utc>> = HashMap::new();
    for event in &events {
        signup
            .entry(event.user_id)
            .and_modify(|first| *first = (*first).min(event.event_time))
            .or_insert(event.event_time);
    }

    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    let mut counts: BTreeMap<NaiveDate, HashMap<i64, u32>> = BTreeMap::new();
    let mut max_age: i64 = 0;
    for event in &events {
        let Some(&first) = signup.get(&event.user_id) else {
            continue;
        };
        let cohort = period.floor(first);
        let event_period = period.floor(event.event_time);
        let age = (event_period - cohort).num_days() / period.days();
        if !seen.insert((event.user_id, age)) {
            continue;
        }
        *counts.entry(cohort).or_default().entry(age).or_insert(0) += 1;
        max_age = max_age.max(age);
    }

    let rows = counts
        .into_iter()
        .map(|(cohort, by_age)| {
            let size = by_age.get(&0).copied().unwrap_or(0);
            let fractions = (0..=max_age)
                .map(|age| {
                    let active = by_age.get(&age).copied().unwrap_or(0);
                    round3(active as f64 / size as f64)
                })
                .collect();
            CohortRow {
                cohort,
                size,
                fractions,
            }
        })
        .collect();

    Ok(RetentionTable { period, rows })
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Two-proportion z-test summary for one named experiment.
///
/// Exactly two groups must be present; anything else is rejected with
/// [`AnalyticsError::ExperimentGroups`] rather than silently producing a
/// positional diff.
pub fn ab_test_summary(store: &Store, test_name: &str) -> crate::Result<AbTestSummary> {
    let records = store.load_experiments(test_name)?;
    if records.is_empty() {
        return Err(AnalyticsError::UnknownExperiment(test_name.to_string()).into());
    }

    let mut grouped: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for record in &records {
        let entry = grouped.entry(record.group_id.clone()).or_insert((0, 0));
        entry.0 += record.converted as u32;
        entry.1 += 1;
    }
    if grouped.len() != 2 {
        return Err(AnalyticsError::ExperimentGroups {
            test_name: test_name.to_string(),
            found: grouped.len(),
        }
        .into());
    }

    let groups: Vec<GroupSummary> = grouped
        .into_iter()
        .map(|(group_id, (conversions, observations))| GroupSummary {
            group_id,
            conversions,
            observations,
            conversion_rate: conversions as f64 / observations as f64,
        })
        .collect();

    let lift = groups[1].conversion_rate - groups[0].conversion_rate;
    let se = (groups[0].conversion_rate * (1.0 - groups[0].conversion_rate)
        / groups[0].observations as f64
        + groups[1].conversion_rate * (1.0 - groups[1].conversion_rate)
            / groups[1].observations as f64)
        .sqrt();

    // With zero sampling variance the normal approximation degenerates:
    // identical rates carry no evidence, differing ones are certain.
    let p_value = if se == 0.0 {
        if lift == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        let normal = Normal::new(0.0, 1.0)?;
        2.0 * (1.0 - normal.cdf(lift.abs() / se))
    };

    Ok(AbTestSummary {
        test_name: test_name.to_string(),
        groups,
        lift,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ColumnDef;
    use chrono::TimeZone;
    use rusqlite::types::Value;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 12, 0, 0).unwrap()
    }

    fn seed_orders(store: &Store, orders: &[(i64, i64, DateTime<Utc>, f64)]) {
        let columns: Vec<ColumnDef> = ["user_id", "order_id", "order_date", "revenue"]
            .iter()
            .zip(["INTEGER", "INTEGER", "TEXT", "REAL"])
            .map(|(name, sql_type)| ColumnDef {
                name: name.to_string(),
                sql_type,
            })
            .collect();
        let rows: Vec<Vec<Value>> = orders
            .iter()
            .map(|&(user, order, date, revenue)| {
                vec![
                    Value::Integer(user),
                    Value::Integer(order),
                    text(&date.to_rfc3339()),
                    Value::Real(revenue),
                ]
            })
            .collect();
        store.replace_table("orders", &columns, &rows).unwrap();
    }

    fn seed_events(store: &Store, events: &[(i64, i64, DateTime<Utc>)]) {
        let columns: Vec<ColumnDef> = ["event_id", "user_id", "event_type", "event_time"]
            .iter()
            .zip(["INTEGER", "INTEGER", "TEXT", "TEXT"])
            .map(|(name, sql_type)| ColumnDef {
                name: name.to_string(),
                sql_type,
            })
            .collect();
        let rows: Vec<Vec<Value>> = events
            .iter()
            .map(|&(event, user, time)| {
                vec![
                    Value::Integer(event),
                    Value::Integer(user),
                    text("view"),
                    text(&time.to_rfc3339()),
                ]
            })
            .collect();
        store.replace_table("events", &columns, &rows).unwrap();
    }

    fn seed_experiments(store: &Store, records: &[(&str, &str, bool)]) {
        let columns: Vec<ColumnDef> = ["test_name", "group_id", "converted"]
            .iter()
            .zip(["TEXT", "TEXT", "INTEGER"])
            .map(|(name, sql_type)| ColumnDef {
                name: name.to_string(),
                sql_type,
            })
            .collect();
        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|&(test, group, converted)| {
                vec![text(test), text(group), Value::Integer(converted as i64)]
            })
            .collect();
        store.replace_table("experiments", &columns, &rows).unwrap();
    }

    #[test]
    fn test_rfm_fixed_example_is_deterministic() {
        // User 1: orders on day 1 and day 11 (revenue 50 + 150).
        // User 2: one order on day 6 (revenue 1000).
        let store = Store::in_memory().unwrap();
        seed_orders(
            &store,
            &[
                (1, 100, day(1), 50.0),
                (1, 101, day(11), 150.0),
                (2, 102, day(6), 1000.0),
            ],
        );

        for _ in 0..2 {
            let rfm = rfm_segmentation(&store).unwrap();
            assert_eq!(rfm.len(), 2);

            let a = &rfm[0];
            assert_eq!(a.user_id, 1);
            assert_eq!(a.recency, 0);
            assert_eq!(a.frequency, 2);
            assert!((a.monetary - 200.0).abs() < 1e-9);
            assert_eq!(a.segment, "331");

            let b = &rfm[1];
            assert_eq!(b.user_id, 2);
            assert_eq!(b.recency, 5);
            assert_eq!(b.frequency, 1);
            assert!((b.monetary - 1000.0).abs() < 1e-9);
            assert_eq!(b.segment, "113");
        }
    }

    #[test]
    fn test_rfm_one_record_per_user_with_valid_scores() {
        let store = Store::in_memory().unwrap();
        let mut orders = Vec::new();
        for user in 1..=9i64 {
            for k in 0..(user % 3 + 1) {
                orders.push((
                    user,
                    user * 100 + k,
                    day((user + k) as u32),
                    10.0 * user as f64 + k as f64,
                ));
            }
        }
        seed_orders(&store, &orders);

        let rfm = rfm_segmentation(&store).unwrap();
        assert_eq!(rfm.len(), 9);
        let users: HashSet<i64> = rfm.iter().map(|r| r.user_id).collect();
        assert_eq!(users.len(), 9);
        for record in &rfm {
            for score in [record.r_score, record.f_score, record.m_score] {
                assert!((1..=3).contains(&score), "score {score} out of range");
            }
            assert_eq!(record.segment.len(), 3);
        }
    }

    #[test]
    fn test_rfm_empty_orders() {
        let store = Store::in_memory().unwrap();
        seed_orders(&store, &[]);
        assert!(rfm_segmentation(&store).unwrap().is_empty());
    }

    #[test]
    fn test_values_at_cut_points_fall_into_lower_band() {
        // Three identical values put everything exactly at both cut-points;
        // strict comparison means nobody clears them.
        assert_eq!(direct_score(5.0, (5.0, 5.0)), 1);
        assert_eq!(inverted_score(5.0, (5.0, 5.0)), 3);
        assert_eq!(direct_score(5.1, (5.0, 5.0)), 3);
        assert_eq!(inverted_score(5.1, (5.0, 5.0)), 1);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 5.0];
        assert!((percentile(&sorted, 0.33) - 1.65).abs() < 1e-9);
        assert!((percentile(&sorted, 0.66) - 3.3).abs() < 1e-9);
        assert!((percentile(&sorted, 1.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_retention_age_zero_is_one() {
        let store = Store::in_memory().unwrap();
        seed_events(
            &store,
            &[
                (1, 1, day(1)),
                (2, 1, day(9)),
                (3, 2, day(2)),
                (4, 3, day(10)),
                (5, 3, day(24)),
            ],
        );

        let table = cohort_retention(&store, Period::Weekly).unwrap();
        assert!(!table.rows.is_empty());
        for row in &table.rows {
            assert_eq!(row.fractions[0], 1.0);
            assert!(row.size >= 1);
            for &fraction in &row.fractions {
                assert!((0.0..=1.0).contains(&fraction));
            }
            assert_eq!(row.fractions.len(), table.max_age() + 1);
        }
    }

    #[test]
    fn test_retention_cohort_sizes_match_signups() {
        let store = Store::in_memory().unwrap();
        // Users 1 and 2 sign up in the week of Jan 1; user 3 in the week of
        // Jan 8. 2024-01-01 is a Monday.
        seed_events(
            &store,
            &[
                (1, 1, day(2)),
                (2, 1, day(3)),
                (3, 2, day(5)),
                (4, 3, day(9)),
                (5, 3, day(16)),
            ],
        );

        let table = cohort_retention(&store, Period::Weekly).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cohort, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(table.rows[0].size, 2);
        assert_eq!(table.rows[1].cohort, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(table.rows[1].size, 1);
    }

    #[test]
    fn test_retention_age_boundary_follows_period_starts() {
        let store = Store::in_memory().unwrap();
        // Signup Wednesday Jan 3. An event the following Sunday (Jan 7) is
        // still age 0; an event the following Tuesday (Jan 9, six days
        // later) crosses the Monday boundary and is age 1.
        seed_events(&store, &[(1, 1, day(3)), (2, 1, day(7)), (3, 1, day(9))]);

        let table = cohort_retention(&store, Period::Weekly).unwrap();
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.fractions.len(), 2);
        assert_eq!(row.fractions[0], 1.0);
        assert_eq!(row.fractions[1], 1.0);
    }

    #[test]
    fn test_retention_daily_periods() {
        let store = Store::in_memory().unwrap();
        seed_events(&store, &[(1, 1, day(1)), (2, 1, day(4))]);

        let table = cohort_retention(&store, Period::Daily).unwrap();
        assert_eq!(table.rows.len(), 1);
        // Ages 0..=3 with activity only at 0 and 3.
        assert_eq!(table.rows[0].fractions, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_ab_test_two_groups() {
        let store = Store::in_memory().unwrap();
        let mut records = Vec::new();
        for i in 0..200 {
            records.push(("checkout_cta", "control", i % 10 == 0));
            records.push(("checkout_cta", "variant", i % 5 == 0));
        }
        seed_experiments(&store, &records);

        let summary = ab_test_summary(&store, "checkout_cta").unwrap();
        assert_eq!(summary.groups.len(), 2);
        assert_eq!(summary.groups[0].group_id, "control");
        assert_eq!(summary.groups[1].group_id, "variant");
        assert!((summary.groups[0].conversion_rate - 0.10).abs() < 1e-9);
        assert!((summary.groups[1].conversion_rate - 0.20).abs() < 1e-9);
        assert!((summary.lift - 0.10).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&summary.p_value));
        assert!((-1.0..=1.0).contains(&summary.lift));
        assert!(summary.p_value < 0.05);
    }

    #[test]
    fn test_ab_test_rejects_other_group_counts() {
        let store = Store::in_memory().unwrap();
        seed_experiments(
            &store,
            &[
                ("three_way", "a", true),
                ("three_way", "b", false),
                ("three_way", "c", false),
                ("one_way", "solo", true),
            ],
        );

        for (test, expected_groups) in [("three_way", 3), ("one_way", 1)] {
            let err = ab_test_summary(&store, test).unwrap_err();
            match err.downcast_ref::<AnalyticsError>() {
                Some(AnalyticsError::ExperimentGroups { found, .. }) => {
                    assert_eq!(*found, expected_groups)
                }
                other => panic!("unexpected error for {test}: {other:?}"),
            }
        }

        let err = ab_test_summary(&store, "missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalyticsError>(),
            Some(AnalyticsError::UnknownExperiment(_))
        ));
    }

    #[test]
    fn test_ab_test_degenerate_variance() {
        let store = Store::in_memory().unwrap();
        seed_experiments(
            &store,
            &[
                ("flat", "a", false),
                ("flat", "a", false),
                ("flat", "b", false),
                ("flat", "b", false),
            ],
        );

        let summary = ab_test_summary(&store, "flat").unwrap();
        assert_eq!(summary.lift, 0.0);
        assert_eq!(summary.p_value, 1.0);
    }
}
