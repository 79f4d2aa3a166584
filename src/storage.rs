//! Sqlite-backed metric store.
//!
//! One row per (metric, day). Dates are stored as ISO-8601 text so the
//! natural sort order is the date order the computation engine expects.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde_json::json;

use crate::logging::{json_log, Level};
use crate::metric::{MetricRef, MetricStore};

pub struct SqliteMetricStore {
    conn: Connection,
}

impl SqliteMetricStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS metric_points (
                metric_id TEXT NOT NULL,
                day TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (metric_id, day)
            );
            COMMIT;",
        )?;
        json_log(Level::Debug, "metric_store_init", json!({}));
        Ok(())
    }

    pub fn record(&mut self, metric_id: &str, day: NaiveDate, value: f64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metric_points (metric_id, day, value)
             VALUES (?1, ?2, ?3)",
            params![metric_id, day.format("%Y-%m-%d").to_string(), value],
        )?;
        Ok(())
    }
}

impl MetricStore for SqliteMetricStore {
    fn data_series(&self, metric: &MetricRef) -> Result<Vec<(NaiveDate, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT day, value FROM metric_points WHERE metric_id = ?1 ORDER BY day",
        )?;
        let rows = stmt.query_map(params![metric.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut series = Vec::new();
        for row in rows {
            let (day, value) = row?;
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .with_context(|| format!("bad day {day} for metric {}", metric.id))?;
            series.push((date, value));
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_round_trip_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.sqlite");
        let mut store = SqliteMetricStore::open(path.to_str().unwrap()).unwrap();
        store.init().unwrap();

        store.record("visits", day("2026-01-02"), 20.0).unwrap();
        store.record("visits", day("2026-01-01"), 10.0).unwrap();
        store.record("purchases", day("2026-01-01"), 3.0).unwrap();

        let series = store.data_series(&MetricRef::new("visits")).unwrap();
        assert_eq!(series, vec![(day("2026-01-01"), 10.0), (day("2026-01-02"), 20.0)]);
    }

    #[test]
    fn test_record_overwrites_same_day() {
        let mut store = SqliteMetricStore::in_memory().unwrap();
        store.init().unwrap();
        store.record("visits", day("2026-01-01"), 10.0).unwrap();
        store.record("visits", day("2026-01-01"), 12.0).unwrap();

        let series = store.data_series(&MetricRef::new("visits")).unwrap();
        assert_eq!(series, vec![(day("2026-01-01"), 12.0)]);
    }
}
