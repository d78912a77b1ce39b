//! SQLite persistence layer.
//!
//! Only this module talks to the database. The ETL loader writes whole
//! tables through [`Store::replace_table`]; the analytics engine reads
//! typed rows back through the `load_*` methods. The handle is passed
//! explicitly to every caller; there is no process-wide connection.

use std::path::Path;

use anyhow::Context;
use rusqlite::types::Value;
use rusqlite::Connection;

use crate::types::{Event, EventType, ExperimentRecord, Order};

/// A column of a stored table: normalized name plus SQLite type keyword.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: &'static str,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening database at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Store { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> crate::Result<Self> {
        Ok(Store {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Drop and recreate `table` with the given columns, then insert every
    /// row. Rows must match the column order.
    pub fn replace_table(
        &self,
        table: &str,
        columns: &[ColumnDef],
        rows: &[Vec<Value>],
    ) -> crate::Result<()> {
        let defs = columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.sql_type))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{table}\"; CREATE TABLE \"{table}\" ({defs});"
        ))?;

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!("INSERT INTO \"{table}\" VALUES ({placeholders})");

        self.conn.execute_batch("BEGIN")?;
        {
            let mut stmt = self.conn.prepare(&insert)?;
            for row in rows {
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Column names of `table`, in declaration order.
    pub fn table_columns(&self, table: &str) -> crate::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn row_count(&self, table: &str) -> crate::Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    /// All orders with a parseable order date.
    pub fn load_orders(&self) -> crate::Result<Vec<Order>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT user_id, order_id, order_date, revenue FROM orders \
                 WHERE order_date IS NOT NULL",
            )
            .context("querying orders; has the ETL step run?")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Order {
                    user_id: row.get(0)?,
                    order_id: row.get(1)?,
                    order_date: row.get(2)?,
                    revenue: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All events with a parseable timestamp.
    pub fn load_events(&self) -> crate::Result<Vec<Event>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT event_id, user_id, event_type, event_time FROM events \
                 WHERE event_time IS NOT NULL",
            )
            .context("querying events; has the ETL step run?")?;
        let rows = stmt
            .query_map([], |row| {
                let raw_type: String = row.get(2)?;
                Ok(Event {
                    event_id: row.get(0)?,
                    user_id: row.get(1)?,
                    event_type: EventType::parse(&raw_type),
                    event_time: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Experiment records for one named test.
    pub fn load_experiments(&self, test_name: &str) -> crate::Result<Vec<ExperimentRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT test_name, group_id, converted FROM experiments \
                 WHERE test_name = ?1",
            )
            .context("querying experiments; has the ETL step run?")?;
        let rows = stmt
            .query_map([test_name], |row| {
                Ok(ExperimentRecord {
                    test_name: row.get(0)?,
                    group_id: row.get(1)?,
                    converted: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn order_columns() -> Vec<ColumnDef> {
        ["user_id", "order_id", "order_date", "revenue"]
            .iter()
            .zip(["INTEGER", "INTEGER", "TEXT", "REAL"])
            .map(|(name, sql_type)| ColumnDef {
                name: name.to_string(),
                sql_type,
            })
            .collect()
    }

    #[test]
    fn test_replace_table_and_load_orders() {
        let store = Store::in_memory().unwrap();
        let when = chrono::Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let rows = vec![
            vec![
                Value::Integer(1),
                Value::Integer(100),
                text(&when.to_rfc3339()),
                Value::Real(49.99),
            ],
            vec![
                Value::Integer(2),
                Value::Integer(101),
                Value::Null,
                Value::Real(10.0),
            ],
        ];
        store.replace_table("orders", &order_columns(), &rows).unwrap();

        assert_eq!(store.row_count("orders").unwrap(), 2);
        assert_eq!(
            store.table_columns("orders").unwrap(),
            vec!["user_id", "order_id", "order_date", "revenue"]
        );

        // The typed reader drops the row whose date failed to parse.
        let orders = store.load_orders().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].user_id, 1);
        assert_eq!(orders[0].order_date, when);
        assert!((orders[0].revenue - 49.99).abs() < 1e-9);
    }

    #[test]
    fn test_replace_table_is_idempotent() {
        let store = Store::in_memory().unwrap();
        let columns = order_columns();
        let row = vec![
            Value::Integer(1),
            Value::Integer(1),
            text("2024-01-01T00:00:00+00:00"),
            Value::Real(1.0),
        ];
        store.replace_table("orders", &columns, &[row.clone()]).unwrap();
        store.replace_table("orders", &columns, &[row]).unwrap();
        assert_eq!(store.row_count("orders").unwrap(), 1);
    }

    #[test]
    fn test_load_before_etl_fails() {
        let store = Store::in_memory().unwrap();
        assert!(store.load_orders().is_err());
    }

    #[test]
    fn test_load_experiments_filters_by_test() {
        let store = Store::in_memory().unwrap();
        let columns: Vec<ColumnDef> = ["test_name", "group_id", "converted"]
            .iter()
            .zip(["TEXT", "TEXT", "INTEGER"])
            .map(|(name, sql_type)| ColumnDef {
                name: name.to_string(),
                sql_type,
            })
            .collect();
        let rows = vec![
            vec![text("checkout_cta"), text("control"), Value::Integer(0)],
            vec![text("checkout_cta"), text("variant"), Value::Integer(1)],
            vec![text("other_test"), text("control"), Value::Integer(1)],
        ];
        store.replace_table("experiments", &columns, &rows).unwrap();

        let records = store.load_experiments("checkout_cta").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.test_name == "checkout_cta"));
        assert_eq!(records.iter().filter(|r| r.converted).count(), 1);
    }
}
