//! Runtime configuration: data directories and database location.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the SQLite database path.
pub const DB_ENV_VAR: &str = "INSIGHTFORGE_DB";

/// Default database file name inside the processed directory.
pub const DEFAULT_DB_FILE: &str = "insightforge.db";

/// Resolved locations for raw inputs, processed outputs, and the database.
///
/// Built once at startup and passed explicitly to everything that needs it;
/// there is no ambient global configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve a configuration from directory settings and an optional
    /// database override. Precedence for the database path: explicit
    /// override, then the `INSIGHTFORGE_DB` environment variable, then
    /// `<processed_dir>/insightforge.db`.
    pub fn resolve(raw_dir: &str, processed_dir: &str, database: Option<&str>) -> Self {
        let processed = PathBuf::from(processed_dir);
        let db_path = database
            .map(PathBuf::from)
            .or_else(|| env::var(DB_ENV_VAR).ok().map(PathBuf::from))
            .unwrap_or_else(|| processed.join(DEFAULT_DB_FILE));
        Config {
            raw_dir: PathBuf::from(raw_dir),
            processed_dir: processed,
            db_path,
        }
    }

    pub fn raw_file(&self, file: &str) -> PathBuf {
        self.raw_dir.join(file)
    }

    /// Path of the Parquet output for a logical table.
    pub fn parquet_file(&self, table: &str) -> PathBuf {
        self.processed_dir.join(format!("{table}.parquet"))
    }

    /// Create the raw and processed directories if they do not exist.
    pub fn ensure_dirs(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.raw_dir)?;
        std::fs::create_dir_all(&self.processed_dir)?;
        if let Some(parent) = self.db_path.parent() {
            if parent != Path::new("") {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_path_lives_in_processed_dir() {
        let config = Config::resolve("raw", "proc", None);
        // Guard against an env override leaking in from the host.
        if env::var(DB_ENV_VAR).is_err() {
            assert_eq!(config.db_path, PathBuf::from("proc").join(DEFAULT_DB_FILE));
        }
        assert_eq!(config.raw_file("orders.csv"), PathBuf::from("raw/orders.csv"));
        assert_eq!(
            config.parquet_file("orders"),
            PathBuf::from("proc/orders.parquet")
        );
    }

    #[test]
    fn test_explicit_database_wins() {
        let config = Config::resolve("raw", "proc", Some("/tmp/custom.db"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom.db"));
    }
}
