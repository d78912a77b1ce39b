//! ETL loader: raw CSV files → normalized Parquet files + SQLite tables.
//!
//! Column names are lowercased, trimmed, and have runs of non-word
//! characters replaced with `_`. Any column whose normalized name contains
//! `date` or `time` is parsed as a UTC timestamp; values that fail to parse
//! become NULL rather than aborting the run. Missing input files are
//! skipped with a warning so partial loads are allowed.

use std::fs::File;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rusqlite::types::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::store::{ColumnDef, Store};

/// Logical table name to raw CSV file. Every entry is optional; `ad_spend`
/// and the `experiments` feed for A/B tests are commonly absent.
pub const TABLE_MAP: &[(&str, &str)] = &[
    ("orders", "orders.csv"),
    ("events", "events.csv"),
    ("ad_spend", "ad_spend.csv"),
    ("experiments", "experiments.csv"),
];

/// Outcome of one table in an ETL run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoad {
    pub table: String,
    /// Row count when loaded, `None` when the input file was missing.
    pub rows: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EtlReport {
    pub tables: Vec<TableLoad>,
}

impl EtlReport {
    pub fn loaded(&self) -> usize {
        self.tables.iter().filter(|t| t.rows.is_some()).count()
    }
}

/// Run the full ETL pass: for each entry of [`TABLE_MAP`], read the raw
/// CSV, standardize it, and write both a Parquet file and a SQLite table.
pub fn run_etl(config: &Config, store: &Store) -> crate::Result<EtlReport> {
    config.ensure_dirs()?;
    let mut tables = Vec::with_capacity(TABLE_MAP.len());

    for &(table, file) in TABLE_MAP {
        let src = config.raw_file(file);
        if !src.exists() {
            warn!("{} not found, skipping {}", src.display(), table);
            tables.push(TableLoad {
                table: table.to_string(),
                rows: None,
            });
            continue;
        }

        let mut df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(500))
            .try_into_reader_with_file_path(Some(src.clone()))?
            .finish()
            .with_context(|| format!("reading {}", src.display()))?;
        standardize(&mut df)?;

        let parquet_path = config.parquet_file(table);
        let parquet_file = File::create(&parquet_path)
            .with_context(|| format!("creating {}", parquet_path.display()))?;
        ParquetWriter::new(parquet_file).finish(&mut df)?;

        let (columns, rows) = to_sql_rows(&df)?;
        store.replace_table(table, &columns, &rows)?;

        info!("loaded {} ({} rows)", table, df.height());
        tables.push(TableLoad {
            table: table.to_string(),
            rows: Some(df.height()),
        });
    }

    let report = EtlReport { tables };
    info!("ETL complete ({}/{} tables)", report.loaded(), TABLE_MAP.len());
    Ok(report)
}

/// Normalize column names in place, then parse date/time columns.
pub fn standardize(df: &mut DataFrame) -> crate::Result<()> {
    let normalized: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| normalize_column(name))
        .collect();
    df.set_column_names(&normalized)
        .context("renaming columns")?;

    for name in normalized {
        if !(name.contains("date") || name.contains("time")) {
            continue;
        }
        let parsed: Vec<Option<i64>> = match df.column(&name)?.str() {
            Ok(ca) => ca
                .into_iter()
                .map(|value| value.and_then(parse_timestamp_micros))
                .collect(),
            // Already numeric or datetime; leave it alone.
            Err(_) => continue,
        };
        let series: Int64Chunked = parsed.into_iter().collect();
        let series = series
            .with_name(&name)
            .into_datetime(TimeUnit::Microseconds, None)
            .into_series();
        df.with_column(series)?;
    }
    Ok(())
}

/// Lowercase, trim, and replace every run of non-word characters with `_`.
pub fn normalize_column(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() || ch == '_' {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Parse one timestamp string to microseconds since the epoch.
fn parse_timestamp_micros(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_micros());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_micros());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_micros());
    }
    None
}

/// Flatten a DataFrame into SQLite column definitions and row values.
fn to_sql_rows(df: &DataFrame) -> crate::Result<(Vec<ColumnDef>, Vec<Vec<Value>>)> {
    let columns: Vec<ColumnDef> = df
        .get_columns()
        .iter()
        .map(|series| ColumnDef {
            name: series.name().to_string(),
            sql_type: sql_type_for(series.dtype()),
        })
        .collect();

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Vec::with_capacity(columns.len());
        for series in df.get_columns() {
            row.push(to_sql_value(series.get(i)?));
        }
        rows.push(row);
    }
    Ok((columns, rows))
}

fn sql_type_for(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Boolean => "INTEGER",
        DataType::Float32 | DataType::Float64 => "REAL",
        _ => "TEXT",
    }
}

fn to_sql_value(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(v) => Value::Integer(v as i64),
        AnyValue::Int8(v) => Value::Integer(v as i64),
        AnyValue::Int16(v) => Value::Integer(v as i64),
        AnyValue::Int32(v) => Value::Integer(v as i64),
        AnyValue::Int64(v) => Value::Integer(v),
        AnyValue::UInt8(v) => Value::Integer(v as i64),
        AnyValue::UInt16(v) => Value::Integer(v as i64),
        AnyValue::UInt32(v) => Value::Integer(v as i64),
        AnyValue::UInt64(v) => Value::Integer(v as i64),
        AnyValue::Float32(v) => Value::Real(v as f64),
        AnyValue::Float64(v) => Value::Real(v),
        AnyValue::String(v) => Value::Text(v.to_string()),
        AnyValue::StringOwned(v) => Value::Text(v.to_string()),
        AnyValue::Datetime(v, unit, _) => {
            let micros = match unit {
                TimeUnit::Nanoseconds => v / 1_000,
                TimeUnit::Microseconds => v,
                TimeUnit::Milliseconds => v * 1_000,
            };
            match DateTime::from_timestamp_micros(micros) {
                Some(dt) => Value::Text(dt.to_rfc3339()),
                None => Value::Null,
            }
        }
        other => Value::Text(other.to_string()),
    }
}
