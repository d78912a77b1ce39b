//! InsightForge: a Rust CLI for customer analytics over order/event data
//!
//! This library computes RFM (Recency, Frequency, Monetary) segmentation,
//! cohort retention, and A/B-test significance from tabular data loaded by
//! a one-shot ETL step (CSV -> Parquet + SQLite), and can train an
//! illustrative churn model on the RFM features. Analytics functions take
//! an explicit [`store::Store`] handle and recompute on every call.

pub mod analytics;
pub mod churn;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod etl;
pub mod generate;
pub mod store;
pub mod types;
pub mod viz;

// Re-export public items for easier access
pub use analytics::{ab_test_summary, cohort_retention, rfm_segmentation, AnalyticsError};
pub use churn::{train_churn_model, ChurnOutcome};
pub use cli::Args;
pub use config::Config;
pub use etl::run_etl;
pub use store::Store;
pub use types::Period;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
