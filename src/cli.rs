//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::types::Period;

/// Customer analytics CLI: RFM segmentation, cohort retention, A/B tests,
/// and churn scoring over order/event data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing the raw CSV inputs
    #[arg(long, default_value = "data/raw")]
    pub raw_dir: String,

    /// Directory for processed outputs (Parquet files and the database)
    #[arg(long, default_value = "data/processed")]
    pub processed_dir: String,

    /// SQLite database path (overrides the INSIGHTFORGE_DB env variable)
    #[arg(long)]
    pub database: Option<String>,

    /// Write a reproducible sample dataset into the raw directory
    #[arg(long)]
    pub generate: bool,

    /// Number of users for --generate
    #[arg(long, default_value = "1000")]
    pub users: usize,

    /// Run the ETL step (raw CSVs -> Parquet + SQLite)
    #[arg(long)]
    pub etl: bool,

    /// Cohort period granularity: 'weekly' or 'daily'
    #[arg(long, default_value = "weekly")]
    pub period: String,

    /// Output path for the segment chart; the retention heatmap path is
    /// derived from it
    #[arg(short, long, default_value = "dashboard.png")]
    pub output: String,

    /// Number of RFM rows to print in the sample table
    #[arg(long, default_value = "10")]
    pub sample_size: usize,

    /// Train the churn model and print AUC plus ranked probabilities
    #[arg(long)]
    pub train_churn: bool,

    /// Print the A/B summary for this test name
    #[arg(long)]
    pub ab_test: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the cohort period flag.
    pub fn period(&self) -> crate::Result<Period> {
        Period::parse(&self.period)
    }
}
