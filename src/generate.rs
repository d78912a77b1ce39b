//! Synthetic raw-data generator for demos and end-to-end tests.
//!
//! Writes `orders.csv`, `events.csv`, and `experiments.csv` into the raw
//! directory. The RNG is seeded so fixtures are reproducible.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::types::EventType;

const EVENT_TYPES: [EventType; 3] = [EventType::View, EventType::AddToCart, EventType::Checkout];

/// Generate a sample dataset for `n_users` users under `raw_dir`.
pub fn write_sample_data(raw_dir: &Path, n_users: usize, seed: u64) -> crate::Result<()> {
    std::fs::create_dir_all(raw_dir)?;
    let mut rng = StdRng::seed_from_u64(seed);

    // Orders and events span the 180 days leading up to a fixed anchor so
    // repeated runs produce identical files.
    let anchor = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();

    let mut orders = BufWriter::new(
        File::create(raw_dir.join("orders.csv")).context("creating orders.csv")?,
    );
    let mut events = BufWriter::new(
        File::create(raw_dir.join("events.csv")).context("creating events.csv")?,
    );
    let mut experiments = BufWriter::new(
        File::create(raw_dir.join("experiments.csv")).context("creating experiments.csv")?,
    );

    writeln!(orders, "user_id,order_id,order_date,revenue")?;
    writeln!(events, "event_id,user_id,event_type,event_time")?;
    writeln!(experiments, "test_name,group_id,converted")?;

    let mut order_id = 1000i64;
    let mut event_id = 1i64;
    for user_id in 1..=n_users as i64 {
        let n_orders = rng.gen_range(1..6);
        for _ in 0..n_orders {
            let order_date = anchor - Duration::days(rng.gen_range(0..180));
            let revenue = sample_revenue(&mut rng);
            writeln!(
                orders,
                "{},{},{},{:.2}",
                user_id,
                order_id,
                order_date.format("%Y-%m-%d"),
                revenue
            )?;
            order_id += 1;

            for event_type in EVENT_TYPES {
                let event_time = order_date + Duration::minutes(rng.gen_range(0..(3 * 24 * 60)));
                writeln!(
                    events,
                    "{},{},{},{}",
                    event_id,
                    user_id,
                    event_type.as_str(),
                    format_event_time(event_time)
                )?;
                event_id += 1;
            }
        }

        let variant = rng.gen_bool(0.5);
        let group = if variant { "variant" } else { "control" };
        let converted = rng.gen_bool(if variant { 0.13 } else { 0.10 });
        writeln!(experiments, "checkout_cta,{},{}", group, converted as u8)?;
    }

    orders.flush()?;
    events.flush()?;
    experiments.flush()?;
    info!(
        "sample data written to {} ({} users, {} orders, {} events)",
        raw_dir.display(),
        n_users,
        order_id - 1000,
        event_id - 1
    );
    Ok(())
}

/// Exponential-ish revenue with a floor, mirroring typical basket sizes.
fn sample_revenue(rng: &mut StdRng) -> f64 {
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    10.0 - 80.0 * u.ln()
}

fn format_event_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}
