//! InsightForge: customer analytics CLI
//!
//! This is the main entrypoint that wires configuration, the ETL step, and
//! the dashboard report together. Flag-driven modes: `--generate` writes a
//! sample dataset, `--etl` loads raw CSVs into processed storage, and a
//! bare invocation renders the dashboard from the database.

use anyhow::Result;
use clap::Parser;
use insightforge::dashboard::{self, DashboardOptions};
use insightforge::{etl, generate, Args, Config, Store};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const GENERATOR_SEED: u64 = 7;

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::resolve(&args.raw_dir, &args.processed_dir, args.database.as_deref());

    if args.generate {
        generate::write_sample_data(&config.raw_dir, args.users, GENERATOR_SEED)?;
    }

    if args.etl {
        let store = Store::open(&config.db_path)?;
        let report = etl::run_etl(&config, &store)?;
        for load in &report.tables {
            match load.rows {
                Some(rows) => println!("✓ Loaded {}  ({} rows)", load.table, rows),
                None => println!("⚠ Skipped {} (no input file)", load.table),
            }
        }
    }

    if !args.generate && !args.etl {
        let store = Store::open(&config.db_path)?;
        let options = DashboardOptions {
            period: args.period()?,
            chart_path: args.output.clone(),
            sample_size: args.sample_size,
            train_churn: args.train_churn,
            ab_test: args.ab_test.clone(),
        };
        dashboard::render_report(&store, &options)?;
    }

    Ok(())
}
