//! Dashboard report: KPIs, segment distribution, RFM sample, retention
//! grid, and the optional churn and A/B sections.
//!
//! Every section recomputes from the store when the report runs; nothing is
//! cached between invocations.

use std::collections::HashMap;

use crate::analytics::{self, RetentionTable, RfmRecord};
use crate::churn;
use crate::store::Store;
use crate::types::Period;
use crate::viz;

/// What to render and where.
#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub period: Period,
    /// PNG path for the segment chart; the retention heatmap path is
    /// derived from it.
    pub chart_path: String,
    /// Rows of the RFM table to print.
    pub sample_size: usize,
    /// Train the churn model and print its section.
    pub train_churn: bool,
    /// Print an A/B summary for this test name.
    pub ab_test: Option<String>,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        DashboardOptions {
            period: Period::Weekly,
            chart_path: "dashboard.png".to_string(),
            sample_size: 10,
            train_churn: false,
            ab_test: None,
        }
    }
}

/// Render the full dashboard report to stdout and the chart PNGs.
pub fn render_report(store: &Store, options: &DashboardOptions) -> crate::Result<()> {
    let rfm = analytics::rfm_segmentation(store)?;

    println!("=== InsightForge Dashboard ===\n");
    print_kpis(&rfm);

    let segments = segment_counts(&rfm);
    if !segments.is_empty() {
        viz::segment_bar_chart(&segments, &options.chart_path)?;
        println!("Segment chart saved to: {}", options.chart_path);
    }

    print_rfm_sample(&rfm, options.sample_size);

    let retention = analytics::cohort_retention(store, options.period)?;
    print_retention(&retention);
    if !retention.rows.is_empty() {
        let heatmap_path = options.chart_path.replace(".png", "_retention.png");
        viz::retention_heatmap(&retention, &heatmap_path)?;
        println!("Retention heatmap saved to: {heatmap_path}");
    }

    if let Some(test_name) = &options.ab_test {
        print_ab_summary(store, test_name)?;
    }

    if options.train_churn {
        print_churn_section(&rfm)?;
    }

    Ok(())
}

fn print_kpis(rfm: &[RfmRecord]) {
    let total_revenue: f64 = rfm.iter().map(|r| r.monetary).sum();
    println!("Total Revenue: $ {total_revenue:.2}");
    println!("Active Users:  {}\n", rfm.len());
}

/// Segment label → user count, ordered by count descending then label.
pub fn segment_counts(rfm: &[RfmRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in rfm {
        *counts.entry(record.segment.as_str()).or_insert(0) += 1;
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(segment, count)| (segment.to_string(), count))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    out
}

fn print_rfm_sample(rfm: &[RfmRecord], sample_size: usize) {
    println!("\n--- RFM sample ---");
    println!(
        "{:>10}  {:>8}  {:>9}  {:>12}  {:>7}",
        "user_id", "recency", "frequency", "monetary", "segment"
    );
    for record in rfm.iter().take(sample_size) {
        println!(
            "{:>10}  {:>8}  {:>9}  {:>12.2}  {:>7}",
            record.user_id, record.recency, record.frequency, record.monetary, record.segment
        );
    }
}

fn print_retention(table: &RetentionTable) {
    println!("\n--- {} retention ---", table.period.label());
    if table.rows.is_empty() {
        println!("(no events)");
        return;
    }
    // Wide grids are unreadable in a terminal; the heatmap carries the rest.
    let shown_ages = (table.max_age() + 1).min(12);
    let header: Vec<String> = (0..shown_ages).map(|a| format!("{a:>6}")).collect();
    println!("{:>12}  {:>5}  {}", "cohort", "size", header.join(""));
    for row in &table.rows {
        let cells: Vec<String> = row
            .fractions
            .iter()
            .take(shown_ages)
            .map(|f| format!("{f:>6.3}"))
            .collect();
        println!("{:>12}  {:>5}  {}", row.cohort.to_string(), row.size, cells.join(""));
    }
}

fn print_ab_summary(store: &Store, test_name: &str) -> crate::Result<()> {
    let summary = analytics::ab_test_summary(store, test_name)?;
    println!("\n--- A/B test: {} ---", summary.test_name);
    for group in &summary.groups {
        println!(
            "{:>12}: {:>6}/{:<6} converted ({:.2}%)",
            group.group_id,
            group.conversions,
            group.observations,
            group.conversion_rate * 100.0
        );
    }
    println!(
        "lift = {:+.4}, p-value = {:.4}",
        summary.lift, summary.p_value
    );
    Ok(())
}

fn print_churn_section(rfm: &[RfmRecord]) -> crate::Result<()> {
    let outcome = churn::train_churn_model(rfm)?;
    println!("\n--- Churn model ---");
    println!("ROC-AUC (held out): {:.3}", outcome.auc);
    println!("{:>10}  {:>10}", "user_id", "churn_prob");
    for score in outcome.scores.iter().take(20) {
        println!("{:>10}  {:>10.3}", score.user_id, score.churn_prob);
    }
    Ok(())
}
